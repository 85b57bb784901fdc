pub mod fingerprintmodel;
pub mod referralmodel;
pub mod usermodel;
