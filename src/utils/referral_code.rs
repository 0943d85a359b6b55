// utils/referral_code.rs
use rand::{distr::Alphanumeric, Rng};

pub const REFERRAL_CODE_LENGTH: usize = 8;

pub fn generate_referral_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(REFERRAL_CODE_LENGTH)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

/// Codes are matched case-insensitively by uppercasing the input.
pub fn normalize_referral_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_uppercase_alphanumeric() {
        for _ in 0..50 {
            let code = generate_referral_code();
            assert_eq!(code.len(), REFERRAL_CODE_LENGTH);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize_referral_code("  ab12cd34 "), "AB12CD34");
    }
}
