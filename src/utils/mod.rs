pub mod password;
pub mod referral_code;
pub mod token;
