//! Vendor accounts: registration, credential checks and bearer-token lifecycle.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::access::Caller;
use crate::error::{AppError, Resource};
use crate::models::{
    AuthResponse, LoginInput, PasswordUpdate, ProfileUpdate, RegisterInput, Vendor, VendorProfile,
};
use crate::password::{hash_password, verify_decoy, verify_password};
use crate::store::{StoreError, VendorStore};
use crate::token::{IssuedToken, TokenIssuer};

pub struct IdentityStore {
    vendors: Arc<dyn VendorStore>,
    tokens: TokenIssuer,
}

impl IdentityStore {
    pub fn new(vendors: Arc<dyn VendorStore>, tokens: TokenIssuer) -> Self {
        IdentityStore { vendors, tokens }
    }

    pub async fn register(&self, input: RegisterInput) -> Result<AuthResponse, AppError> {
        require("name", &input.name)?;
        require("email", &input.email)?;
        require("password", &input.password)?;
        require("companyName", &input.company_name)?;

        if self.vendors.find_vendor_by_email(&input.email).await?.is_some() {
            return Err(AppError::DuplicateEmail);
        }

        let hashed_password = hash_password(input.password).await?;
        let id = Uuid::new_v4().to_string();
        let issued = self.issue(&id)?;
        let now = Utc::now();

        let vendor = Vendor {
            id,
            name: input.name,
            email: input.email,
            password: hashed_password,
            company_name: input.company_name,
            business_type: input.business_type,
            address: None,
            phone: None,
            website: None,
            tax_id: None,
            approved: true,
            tokens: vec![issued.token_id],
            products: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        match self.vendors.insert_vendor(&vendor).await {
            Ok(()) => {}
            // Lost a race against another registration for the same email.
            Err(StoreError::Duplicate) => return Err(AppError::DuplicateEmail),
            Err(e) => return Err(e.into()),
        }

        log::info!("registered vendor {}", vendor.id);
        Ok(auth_response(&vendor, issued.token))
    }

    pub async fn login(&self, input: LoginInput) -> Result<AuthResponse, AppError> {
        if input.email.is_empty() || input.password.is_empty() {
            return Err(AppError::validation("please provide email and password"));
        }

        let Some(vendor) = self.vendors.find_vendor_by_email(&input.email).await? else {
            verify_decoy(input.password).await?;
            return Err(AppError::NotFound(Resource::Vendor));
        };

        if !verify_password(vendor.password.clone(), input.password).await? {
            return Err(AppError::InvalidCredentials);
        }

        let issued = self.issue(&vendor.id)?;
        if !self.vendors.add_token(&vendor.id, &issued.token_id).await? {
            return Err(AppError::NotFound(Resource::Vendor));
        }

        Ok(auth_response(&vendor, issued.token))
    }

    /// Checks signature and expiry, then that the token id is still active on
    /// the account. Reads the account on every call; nothing is cached.
    pub async fn verify_token(&self, token: &str) -> Result<Caller, AppError> {
        let claims = self.tokens.decode(token)?;

        let vendor = self
            .vendors
            .find_vendor(&claims.sub)
            .await?
            .ok_or(AppError::RevokedToken)?;

        if !vendor.tokens.iter().any(|t| *t == claims.jti) {
            return Err(AppError::RevokedToken);
        }

        Ok(Caller {
            vendor_id: vendor.id,
            token_id: claims.jti,
        })
    }

    pub async fn profile(&self, caller: &Caller) -> Result<VendorProfile, AppError> {
        self.vendors
            .find_vendor(&caller.vendor_id)
            .await?
            .map(VendorProfile::from)
            .ok_or(AppError::NotFound(Resource::Vendor))
    }

    pub async fn update_profile(
        &self,
        caller: &Caller,
        update: ProfileUpdate,
    ) -> Result<VendorProfile, AppError> {
        for (field, value) in [
            ("name", &update.name),
            ("email", &update.email),
            ("companyName", &update.company_name),
        ] {
            if let Some(value) = value {
                require(field, value)?;
            }
        }

        if let Some(email) = &update.email {
            if let Some(other) = self.vendors.find_vendor_by_email(email).await? {
                if other.id != caller.vendor_id {
                    return Err(AppError::DuplicateEmail);
                }
            }
        }

        let updated = match self
            .vendors
            .update_profile(&caller.vendor_id, &update, Utc::now())
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::Duplicate) => return Err(AppError::DuplicateEmail),
            Err(e) => return Err(e.into()),
        };

        updated
            .map(VendorProfile::from)
            .ok_or(AppError::NotFound(Resource::Vendor))
    }

    /// Changes the password and revokes every token issued so far, including
    /// the one used for this call.
    pub async fn update_password(
        &self,
        caller: &Caller,
        update: PasswordUpdate,
    ) -> Result<VendorProfile, AppError> {
        require("newPassword", &update.new_password)?;

        let vendor = self
            .vendors
            .find_vendor(&caller.vendor_id)
            .await?
            .ok_or(AppError::NotFound(Resource::Vendor))?;

        if !verify_password(vendor.password.clone(), update.current_password).await? {
            return Err(AppError::InvalidCredentials);
        }

        let hashed_password = hash_password(update.new_password).await?;
        let now = Utc::now();
        if !self
            .vendors
            .set_password(&vendor.id, &hashed_password, now)
            .await?
        {
            return Err(AppError::NotFound(Resource::Vendor));
        }

        log::info!("password changed for vendor {}, all tokens revoked", vendor.id);

        let mut profile = VendorProfile::from(vendor);
        profile.updated_at = now;
        Ok(profile)
    }

    /// Revokes exactly `caller`'s token. Revoking an already revoked token is a no-op.
    pub async fn logout(&self, caller: &Caller) -> Result<(), AppError> {
        let removed = self
            .vendors
            .remove_token(&caller.vendor_id, &caller.token_id)
            .await?;
        if !removed {
            log::debug!("logout for vendor {}: token already inactive", caller.vendor_id);
        }
        Ok(())
    }

    fn issue(&self, vendor_id: &str) -> Result<IssuedToken, AppError> {
        self.tokens
            .issue(vendor_id)
            .map_err(|e| AppError::Internal(format!("failed to encode token: {e}")))
    }
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(())
}

fn auth_response(vendor: &Vendor, token: String) -> AuthResponse {
    AuthResponse {
        vendor_id: vendor.id.clone(),
        name: vendor.name.clone(),
        email: vendor.email.clone(),
        company_name: vendor.company_name.clone(),
        business_type: vendor.business_type,
        token,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use testresult::TestResult;

    use super::*;
    use crate::models::BusinessType;
    use crate::store::MemoryStore;
    use crate::token::TokenError;

    const SECRET: &str = "identity-test-secret";

    fn identity() -> IdentityStore {
        IdentityStore::new(
            Arc::new(MemoryStore::new()),
            TokenIssuer::new(SECRET, Duration::days(30)),
        )
    }

    fn registration(email: &str, password: &str) -> RegisterInput {
        RegisterInput {
            name: "Ada".to_string(),
            email: email.to_string(),
            password: password.to_string(),
            company_name: "Ada Supplies".to_string(),
            business_type: BusinessType::Wholesaler,
        }
    }

    fn login(email: &str, password: &str) -> LoginInput {
        LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn register_returns_usable_token() -> TestResult {
        let identity = identity();

        let registered = identity.register(registration("a@b.com", "right")).await?;
        let caller = identity.verify_token(&registered.token).await?;

        assert_eq!(caller.vendor_id, registered.vendor_id);
        assert_eq!(registered.business_type, BusinessType::Wholesaler);

        Ok(())
    }

    #[tokio::test]
    async fn register_stores_only_a_hash() -> TestResult {
        let store = Arc::new(MemoryStore::new());
        let identity = IdentityStore::new(store.clone(), TokenIssuer::new(SECRET, Duration::days(30)));

        identity.register(registration("a@b.com", "right")).await?;
        let stored = store.find_vendor_by_email("a@b.com").await?.expect("vendor stored");

        assert_ne!(stored.password, "right");
        assert!(stored.approved);

        Ok(())
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_and_first_account_survives() -> TestResult {
        let identity = identity();
        let first = identity.register(registration("a@b.com", "right")).await?;

        let second = identity.register(registration("a@b.com", "other")).await;
        assert!(
            matches!(second, Err(AppError::DuplicateEmail)),
            "expected DuplicateEmail, got {second:?}"
        );

        let relogin = identity.login(login("a@b.com", "right")).await?;
        assert_eq!(relogin.vendor_id, first.vendor_id);

        Ok(())
    }

    #[tokio::test]
    async fn register_requires_fields() {
        let identity = identity();
        let mut input = registration("a@b.com", "right");
        input.company_name = "  ".to_string();

        let result = identity.register(input).await;

        assert!(matches!(result, Err(AppError::Validation(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn login_with_right_password_issues_verifiable_token() -> TestResult {
        let identity = identity();
        identity.register(registration("a@b.com", "right")).await?;

        let session = identity.login(login("a@b.com", "right")).await?;
        let caller = identity.verify_token(&session.token).await?;

        assert_eq!(caller.vendor_id, session.vendor_id);

        Ok(())
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_invalid_credentials() -> TestResult {
        let identity = identity();
        identity.register(registration("a@b.com", "right")).await?;

        let result = identity.login(login("a@b.com", "wrong")).await;

        assert!(matches!(result, Err(AppError::InvalidCredentials)), "got {result:?}");

        Ok(())
    }

    #[tokio::test]
    async fn login_with_unknown_email_is_not_found() {
        let result = identity().login(login("nobody@b.com", "right")).await;

        assert!(
            matches!(result, Err(AppError::NotFound(Resource::Vendor))),
            "got {result:?}"
        );
    }

    #[tokio::test]
    async fn login_requires_email_and_password() {
        let result = identity().login(login("", "")).await;

        assert!(matches!(result, Err(AppError::Validation(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn tampered_token_is_invalid() -> TestResult {
        let identity = identity();
        let registered = identity.register(registration("a@b.com", "right")).await?;

        let tampered = format!("{}x", registered.token);
        let result = identity.verify_token(&tampered).await;

        assert!(
            matches!(result, Err(AppError::InvalidToken(TokenError::Malformed))),
            "got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn token_not_recorded_on_account_is_revoked() -> TestResult {
        let identity = identity();
        let registered = identity.register(registration("a@b.com", "right")).await?;

        // Correctly signed, but never recorded against the account.
        let stray = TokenIssuer::new(SECRET, Duration::days(30)).issue(&registered.vendor_id)?;
        let result = identity.verify_token(&stray.token).await;

        assert!(matches!(result, Err(AppError::RevokedToken)), "got {result:?}");

        Ok(())
    }

    #[tokio::test]
    async fn logout_revokes_only_that_token() -> TestResult {
        let identity = identity();
        let registered = identity.register(registration("a@b.com", "right")).await?;
        let second = identity.login(login("a@b.com", "right")).await?;

        let caller = identity.verify_token(&registered.token).await?;
        identity.logout(&caller).await?;

        let result = identity.verify_token(&registered.token).await;
        assert!(matches!(result, Err(AppError::RevokedToken)), "got {result:?}");
        identity.verify_token(&second.token).await?;

        // Idempotent.
        identity.logout(&caller).await?;

        Ok(())
    }

    #[tokio::test]
    async fn update_password_revokes_previous_tokens() -> TestResult {
        let identity = identity();
        let registered = identity.register(registration("a@b.com", "right")).await?;
        let caller = identity.verify_token(&registered.token).await?;

        identity
            .update_password(
                &caller,
                PasswordUpdate {
                    current_password: "right".to_string(),
                    new_password: "newer".to_string(),
                },
            )
            .await?;

        let result = identity.verify_token(&registered.token).await;
        assert!(matches!(result, Err(AppError::RevokedToken)), "got {result:?}");

        let old = identity.login(login("a@b.com", "right")).await;
        assert!(matches!(old, Err(AppError::InvalidCredentials)), "got {old:?}");
        identity.login(login("a@b.com", "newer")).await?;

        Ok(())
    }

    #[tokio::test]
    async fn update_password_requires_current_password() -> TestResult {
        let identity = identity();
        let registered = identity.register(registration("a@b.com", "right")).await?;
        let caller = identity.verify_token(&registered.token).await?;

        let result = identity
            .update_password(
                &caller,
                PasswordUpdate {
                    current_password: "wrong".to_string(),
                    new_password: "newer".to_string(),
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::InvalidCredentials)), "got {result:?}");
        identity.verify_token(&registered.token).await?;

        Ok(())
    }

    #[tokio::test]
    async fn update_profile_applies_only_supplied_fields() -> TestResult {
        let identity = identity();
        let registered = identity.register(registration("a@b.com", "right")).await?;
        let caller = identity.verify_token(&registered.token).await?;

        let profile = identity
            .update_profile(
                &caller,
                ProfileUpdate {
                    phone: Some("555-0100".to_string()),
                    business_type: Some(BusinessType::Retailer),
                    ..ProfileUpdate::default()
                },
            )
            .await?;

        assert_eq!(profile.name, "Ada");
        assert_eq!(profile.email, "a@b.com");
        assert_eq!(profile.phone.as_deref(), Some("555-0100"));
        assert_eq!(profile.business_type, BusinessType::Retailer);

        Ok(())
    }

    #[tokio::test]
    async fn update_profile_rejects_taken_email() -> TestResult {
        let identity = identity();
        identity.register(registration("taken@b.com", "right")).await?;
        let registered = identity.register(registration("a@b.com", "right")).await?;
        let caller = identity.verify_token(&registered.token).await?;

        let result = identity
            .update_profile(
                &caller,
                ProfileUpdate {
                    email: Some("taken@b.com".to_string()),
                    ..ProfileUpdate::default()
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::DuplicateEmail)), "got {result:?}");

        Ok(())
    }

    #[tokio::test]
    async fn profile_hides_nothing_but_secrets() -> TestResult {
        let identity = identity();
        let registered = identity.register(registration("a@b.com", "right")).await?;
        let caller = identity.verify_token(&registered.token).await?;

        let profile = identity.profile(&caller).await?;
        let json = serde_json::to_value(&profile)?;

        assert_eq!(profile.id, registered.vendor_id);
        assert!(json.get("password").is_none());
        assert!(json.get("tokens").is_none());

        Ok(())
    }
}
