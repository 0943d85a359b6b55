// dtos/userdtos.rs
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::{transactionmodel::LedgerTransaction, usermodel::User},
    service::{
        marketplace::{AccountOverview, ReferralContact},
        registration::NewRegistration,
    },
};

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct RegisterUserDto {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(
        length(min = 1, message = "Password is required"),
        length(min = 6, message = "Password must be at least 6 characters")
    )]
    pub password: String,

    #[validate(
        length(min = 1, message = "Confirm Password is required"),
        must_match(other = "password", message = "passwords do not match")
    )]
    #[serde(rename = "passwordConfirm")]
    pub password_confirm: String,

    /// Referral code of the user who invited this one.
    pub referral_code: Option<String>,
}

impl From<RegisterUserDto> for NewRegistration {
    fn from(dto: RegisterUserDto) -> Self {
        NewRegistration {
            name: dto.name,
            email: dto.email,
            password: dto.password,
            upline_referral_code: dto.referral_code,
        }
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct LoginUserDto {
    #[validate(length(min = 1, message = "Email is required"), email(message = "Email is invalid"))]
    pub email: String,
    #[validate(
        length(min = 1, message = "Password is required"),
        length(min = 6, message = "Password must be at least 6 characters")
    )]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilterUserDto {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub balance: BigDecimal,
    pub referral_code: String,
    pub upline_id: Option<String>,
    pub registration_status: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl FilterUserDto {
    pub fn filter_user(user: &User) -> Self {
        FilterUserDto {
            id: user.id.to_string(),
            name: user.name.to_owned(),
            email: user.email.to_owned(),
            role: user.role.to_str().to_string(),
            balance: user.balance.clone(),
            referral_code: user.referral_code.to_owned(),
            upline_id: user.upline_id.map(|id| id.to_string()),
            registration_status: user.registration_status.to_str().to_string(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserData {
    pub user: FilterUserDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponseDto {
    pub status: String,
    pub data: UserData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserLoginResponseDto {
    pub status: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct AccountData {
    pub user: FilterUserDto,
    pub upline: Option<ReferralContact>,
    pub downlines: Vec<ReferralContact>,
    pub transactions: Vec<LedgerTransaction>,
}

#[derive(Debug, Serialize)]
pub struct AccountResponseDto {
    pub status: String,
    pub data: AccountData,
}

impl From<AccountOverview> for AccountResponseDto {
    fn from(overview: AccountOverview) -> Self {
        AccountResponseDto {
            status: "success".to_string(),
            data: AccountData {
                user: FilterUserDto::filter_user(&overview.user),
                upline: overview.upline,
                downlines: overview.downlines,
                transactions: overview.transactions,
            },
        }
    }
}
