pub mod fingerprint;
pub mod referral;
