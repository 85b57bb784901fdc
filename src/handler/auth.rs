use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};
use axum_extra::extract::cookie::Cookie;
use validator::Validate;

use crate::{
    db::userdb::UserExt,
    dtos::{
        FilterUserDto, FraudCheckDto, FraudCheckResponseDto, LoginUserDto, ReferralOutcomeDto,
        RegisterResponseDto, RegisterUserDto, UserData, UserLoginResponseDto,
    },
    error::{ErrorMessage, HttpError},
    service::fingerprint::{find_matching_fingerprint, is_same_device, similarity_score},
    service::referral::{award_referral_points, generate_referral_code, FraudReason, ReferralError},
    utils::{password, token},
    AppState,
};

pub fn auth_handler() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/fraud-check", post(fraud_check))
}

pub async fn register(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<RegisterUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let existing_user = app_state
        .db_client
        .get_user(None, None, Some(&body.email))
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if existing_user.is_some() {
        return Err(HttpError::bad_request(ErrorMessage::EmailExist.to_string()));
    }

    let existing_username = app_state
        .db_client
        .get_user(None, Some(&body.username), None)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if existing_username.is_some() {
        return Err(HttpError::bad_request(
            ErrorMessage::UsernameExist.to_string(),
        ));
    }

    let hashed_password =
        password::hash(&body.password).map_err(|e| HttpError::server_error(e.to_string()))?;

    // The account's own code is fixed at creation; uniqueness is enforced by
    // the store's constraint.
    let referral_code = generate_referral_code();

    let user = app_state
        .db_client
        .save_user(
            body.name,
            body.username,
            body.email,
            hashed_password,
            referral_code,
            body.referral_code.clone(),
            body.fingerprint.clone(),
        )
        .await
        .map_err(|e| {
            if e.as_database_error()
                .map_or(false, |db_err| db_err.is_unique_violation())
            {
                HttpError::unique_constraint_violation(ErrorMessage::EmailExist.to_string())
            } else {
                HttpError::server_error(e.to_string())
            }
        })?;

    // The account is committed from here on. Whatever happens to the points
    // award, the new user stays registered.
    let referral = if let Some(ref code) = body.referral_code {
        let outcome = award_referral_points(
            app_state.db_client.as_ref(),
            code,
            user.id,
            body.fingerprint.as_ref(),
            app_state.env.same_device_threshold,
        )
        .await;

        match outcome {
            Ok(award) => Some(ReferralOutcomeDto {
                status: "awarded".to_string(),
                reason: None,
                referrer_points_awarded: award.referrer_points_awarded,
                new_user_points_awarded: award.new_user_points_awarded,
            }),
            Err(ReferralError::FraudDetected(reason)) => Some(ReferralOutcomeDto {
                status: "withheld".to_string(),
                reason: Some(reason),
                referrer_points_awarded: 0,
                new_user_points_awarded: 0,
            }),
            Err(ReferralError::ReferrerNotFound(_)) => Some(ReferralOutcomeDto {
                status: "invalid_code".to_string(),
                reason: None,
                referrer_points_awarded: 0,
                new_user_points_awarded: 0,
            }),
            Err(e) => return Err(e.into()),
        }
    } else {
        None
    };

    let filtered_user = FilterUserDto::filter_user(&user);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponseDto {
            status: "success".to_string(),
            data: UserData {
                user: filtered_user,
            },
            referral,
        }),
    ))
}

pub async fn login(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<LoginUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = app_state
        .db_client
        .get_user(None, None, Some(&body.email))
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let user = result.ok_or(HttpError::bad_request(
        ErrorMessage::WrongCredentials.to_string(),
    ))?;

    let password_matched = password::compare(&body.password, &user.password)
        .map_err(|_| HttpError::bad_request(ErrorMessage::WrongCredentials.to_string()))?;

    if !password_matched {
        return Err(HttpError::bad_request(
            ErrorMessage::WrongCredentials.to_string(),
        ));
    }

    // Wholesale replacement: the stored snapshot keeps no history.
    if let Some(fingerprint) = body.fingerprint {
        app_state
            .db_client
            .update_user_fingerprint(user.id, fingerprint)
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?;
    }

    let token = token::create_token(
        &user.id.to_string(),
        app_state.env.jwt_secret.as_bytes(),
        app_state.env.jwt_maxage,
    )
    .map_err(|e| HttpError::server_error(e.to_string()))?;

    let cookie_duration = time::Duration::minutes(app_state.env.jwt_maxage * 60);
    let cookie = Cookie::build(("token", token.clone()))
        .path("/")
        .max_age(cookie_duration)
        .http_only(true)
        .build();

    let response = Json(UserLoginResponseDto {
        status: "success".to_string(),
        token,
    });

    let mut headers = HeaderMap::new();

    headers.append(
        header::SET_COOKIE,
        cookie
            .to_string()
            .parse()
            .map_err(|_| HttpError::server_error("Failed to build session cookie"))?,
    );

    let mut response = response.into_response();
    response.headers_mut().extend(headers);

    Ok(response)
}

/// Pre-registration fraud check: reports what the referral guard would decide
/// for this fingerprint without creating or mutating anything.
pub async fn fraud_check(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<FraudCheckDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let threshold = body
        .threshold
        .unwrap_or(app_state.env.same_device_threshold);

    let accounts = app_state
        .db_client
        .get_users_with_fingerprint()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let matched_existing_account =
        find_matching_fingerprint(&body.fingerprint, &accounts, threshold).is_some();

    let visitor_id_seen = match body.fingerprint.visitor_id.as_deref() {
        Some(id) if !id.is_empty() => app_state
            .db_client
            .get_user_by_visitor_id(id)
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?
            .is_some(),
        _ => false,
    };

    let mut similarity_to_referrer = None;
    let mut self_referral = false;

    if let Some(ref code) = body.referral_code {
        let referrer = app_state
            .db_client
            .get_user_by_referral_code(code)
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?
            .ok_or_else(|| HttpError::bad_request("Invalid referral code"))?;

        similarity_to_referrer = referrer
            .fingerprint_record()
            .map(|stored| similarity_score(stored, &body.fingerprint));
        self_referral = is_same_device(
            referrer.fingerprint_record(),
            Some(&body.fingerprint),
            threshold,
        );
    }

    let reason = if self_referral {
        FraudReason::SelfReferral
    } else if matched_existing_account {
        FraudReason::MultiAccount
    } else {
        FraudReason::None
    };

    Ok(Json(FraudCheckResponseDto {
        status: "success".to_string(),
        allowed: reason == FraudReason::None,
        reason,
        threshold,
        similarity_to_referrer,
        matched_existing_account,
        visitor_id_seen,
    }))
}
