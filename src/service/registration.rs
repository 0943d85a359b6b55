// service/registration.rs
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::{
    db::ledger::{LedgerStore, LedgerUnit},
    error::ErrorMessage,
    models::usermodel::{NewUser, RegistrationStatus, User, UserRole},
    service::{error::ServiceError, unit_of_work::bounded},
    utils::{
        password,
        referral_code::{generate_referral_code, normalize_referral_code},
        token,
    },
};

const REFERRAL_CODE_ATTEMPTS: usize = 5;
const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub upline_referral_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegistrationService {
    store: Arc<dyn LedgerStore>,
    jwt_secret: String,
    jwt_maxage: i64,
    timeout: Duration,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn LedgerStore>, jwt_secret: String, jwt_maxage: i64, timeout: Duration) -> Self {
        Self {
            store,
            jwt_secret,
            jwt_maxage,
            timeout,
        }
    }

    /// Creates a worker account awaiting admin approval. The upline, if any,
    /// must already exist, so the referral tree can never close a loop.
    pub async fn register_user(&self, registration: NewRegistration) -> Result<User, ServiceError> {
        let name = registration.name.trim().to_string();
        let email = registration.email.trim().to_lowercase();

        if name.is_empty() {
            return Err(ServiceError::Validation("Name is required".to_string()));
        }
        if !validator::validate_email(email.as_str()) {
            return Err(ServiceError::Validation("Email is invalid".to_string()));
        }
        if registration.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ServiceError::Validation(
                "Password must be at least 6 characters".to_string(),
            ));
        }

        let password_hash = password::hash(registration.password)
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let mut unit = self.store.begin().await?;

        if unit.get_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::Validation("Email already registered".to_string()));
        }

        let upline_id = match registration.upline_referral_code.as_deref() {
            Some(code) if !code.trim().is_empty() => {
                let code = normalize_referral_code(code);
                let upline = unit
                    .get_user_by_referral_code(&code)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("referral code {}", code)))?;
                Some(upline.id)
            }
            _ => None,
        };

        let referral_code = unique_referral_code(unit.as_mut()).await?;

        let user = unit
            .insert_user(NewUser {
                name,
                email,
                password_hash,
                role: UserRole::Worker,
                upline_id,
                referral_code,
                registration_status: RegistrationStatus::Pending,
            })
            .await?;
        unit.commit().await?;

        tracing::info!(
            user_id = %user.id,
            upline_id = ?user.upline_id,
            referral_code = %user.referral_code,
            "User registered"
        );
        Ok(user)
    }

    pub async fn approve_registration(&self, user_id: Uuid, approver_id: Uuid) -> Result<User, ServiceError> {
        bounded(self.timeout, "approve_registration", async {
            let mut unit = self.store.begin().await?;

            let user = unit
                .lock_user(user_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("user {}", user_id)))?;

            if user.registration_status != RegistrationStatus::Pending {
                return Err(ServiceError::AlreadyProcessed {
                    entity: "registration",
                    id: user_id,
                });
            }

            let user = unit
                .set_registration_status(user_id, RegistrationStatus::Approved)
                .await?;
            unit.commit().await?;

            tracing::info!(%user_id, %approver_id, "Registration approved");
            Ok(user)
        })
        .await
    }

    /// Checks the credentials and issues a session token.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<(User, String), ServiceError> {
        let user = {
            let mut unit = self.store.begin().await?;
            let found = unit.get_user_by_email(email.trim()).await?;
            found
        };

        let user = user.ok_or_else(|| ServiceError::Unauthorized(ErrorMessage::WrongCredentials.to_string()))?;

        let password_matched = password::compare(password, &user.password)
            .map_err(|_| ServiceError::Unauthorized(ErrorMessage::WrongCredentials.to_string()))?;
        if !password_matched {
            return Err(ServiceError::Unauthorized(ErrorMessage::WrongCredentials.to_string()));
        }

        if user.registration_status != RegistrationStatus::Approved {
            return Err(ServiceError::Forbidden(
                ErrorMessage::RegistrationNotApproved.to_string(),
            ));
        }

        let token = token::create_token(
            &user.id.to_string(),
            user.role,
            self.jwt_secret.as_bytes(),
            self.jwt_maxage,
        )
        .map_err(|e| ServiceError::Storage(e.to_string()))?;

        Ok((user, token))
    }

    /// Creates an approved super admin unless the email is already taken.
    /// Lets a fresh deployment act on its first registrations.
    pub async fn ensure_admin(&self, name: &str, email: &str, password: &str) -> Result<User, ServiceError> {
        let email = email.trim().to_lowercase();
        let password_hash = password::hash(password).map_err(|e| ServiceError::Validation(e.to_string()))?;

        let mut unit = self.store.begin().await?;
        if let Some(existing) = unit.get_user_by_email(&email).await? {
            return Ok(existing);
        }

        let referral_code = unique_referral_code(unit.as_mut()).await?;
        let admin = unit
            .insert_user(NewUser {
                name: name.to_string(),
                email,
                password_hash,
                role: UserRole::SuperAdmin,
                upline_id: None,
                referral_code,
                registration_status: RegistrationStatus::Approved,
            })
            .await?;
        unit.commit().await?;

        tracing::info!(user_id = %admin.id, "Bootstrap admin created");
        Ok(admin)
    }
}

async fn unique_referral_code(unit: &mut dyn LedgerUnit) -> Result<String, ServiceError> {
    for _ in 0..REFERRAL_CODE_ATTEMPTS {
        let code = generate_referral_code();
        if unit.get_user_by_referral_code(&code).await?.is_none() {
            return Ok(code);
        }
        tracing::debug!(%code, "Referral code collision, retrying");
    }

    Err(ServiceError::Conflict(
        "could not allocate a unique referral code".to_string(),
    ))
}
