use crate::models::fingerprintmodel::FingerprintRecord;
use crate::models::usermodel::User;

/// Default same-device threshold used by the referral flow. The ad-hoc
/// fraud-check endpoint may override it per request.
pub const DEFAULT_SAME_DEVICE_THRESHOLD: f64 = 0.7;

fn compare_str(a: Option<&str>, b: Option<&str>) -> Option<bool> {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Some(a == b),
        _ => None,
    }
}

fn compare_num(a: Option<i32>, b: Option<i32>) -> Option<bool> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a == b),
        _ => None,
    }
}

/// Fraction of the critical fields that match between two snapshots.
///
/// Only fields present in both records count; a field missing on either side
/// contributes to neither numerator nor denominator, so sparse-but-matching
/// data still scores high. Zero comparable fields scores 0.0.
pub fn similarity_score(a: &FingerprintRecord, b: &FingerprintRecord) -> f64 {
    let results = [
        compare_str(a.platform.as_deref(), b.platform.as_deref()),
        compare_str(a.vendor.as_deref(), b.vendor.as_deref()),
        compare_str(a.user_agent.as_deref(), b.user_agent.as_deref()),
        compare_str(a.screen_resolution.as_deref(), b.screen_resolution.as_deref()),
        compare_num(a.hardware_concurrency, b.hardware_concurrency),
        compare_num(a.max_touch_points, b.max_touch_points),
        compare_str(a.timezone.as_deref(), b.timezone.as_deref()),
        compare_str(a.language.as_deref(), b.language.as_deref()),
    ];

    let comparisons = results.iter().filter(|r| r.is_some()).count();
    if comparisons == 0 {
        return 0.0;
    }
    let matches = results.iter().filter(|r| **r == Some(true)).count();

    matches as f64 / comparisons as f64
}

/// Verdict on whether two snapshots came from the same device. Fails closed:
/// a missing record is never a match.
pub fn is_same_device(
    a: Option<&FingerprintRecord>,
    b: Option<&FingerprintRecord>,
    threshold: f64,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => similarity_score(a, b) >= threshold,
        _ => false,
    }
}

/// First account (store iteration order) whose stored fingerprint looks like
/// the same device as `candidate`. Accounts without a visitor id are skipped.
pub fn find_matching_fingerprint<'a>(
    candidate: &FingerprintRecord,
    accounts: &'a [User],
    threshold: f64,
) -> Option<&'a User> {
    accounts.iter().find(|user| {
        user.fingerprint_record()
            .map_or(false, |stored| {
                stored.has_visitor_id() && is_same_device(Some(stored), Some(candidate), threshold)
            })
    })
}

/// Exact visitor-id lookup, independent of the similarity scoring.
pub fn find_by_visitor_id<'a>(visitor_id: &str, accounts: &'a [User]) -> Option<&'a User> {
    if visitor_id.is_empty() {
        return None;
    }
    accounts.iter().find(|user| {
        user.fingerprint_record()
            .and_then(|fp| fp.visitor_id.as_deref())
            .map_or(false, |id| id == visitor_id)
    })
}
