use std::sync::Arc;

use chrono::Duration;

use habbot_auth::{
    AccessClaims, GuardError, Hs256Jwt, JwtValidator, TokenPurpose, User, UserGuard, verify_password,
};
use habbot_core::DomainError;
use habbot_infra::{StoreError, UserStore};
use habbot_observability::{Logger, LoggerFactory, LoggerOptions, call_info};

use crate::app::dto::{
    ApiResponse, LoginData, LoginRequest, SignupData, SignupRequest, VerifiedEmailData, VerifyEmailRequest,
};
use crate::app::errors::ApiError;

const CLASS: &str = "AuthService";

pub struct AuthService {
    users: Arc<dyn UserStore>,
    jwt: Arc<Hs256Jwt>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    logger: Logger,
    helpers: Logger,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        jwt: Arc<Hs256Jwt>,
        access_ttl: Duration,
        refresh_ttl: Duration,
        logs: &LoggerFactory,
    ) -> Self {
        Self {
            users,
            jwt,
            access_ttl,
            refresh_ttl,
            logger: logs.get_logger(CLASS, LoggerOptions::default()),
            helpers: logs.get_logger("AuthHelpers", LoggerOptions::non_request()),
        }
    }

    pub fn validator(&self) -> Arc<dyn JwtValidator> {
        self.jwt.clone()
    }

    pub async fn login(&self, input: LoginRequest) -> Result<ApiResponse<LoginData>, ApiError> {
        let call = call_info!("login_user").in_class(CLASS).arg("login_data", &input);
        self.logger
            .track_async(call, async {
                let user = self
                    .users
                    .find_by_email(&input.email)
                    .await
                    .map_err(|e| ApiError::store("logging in", e))?
                    .filter(|user| verify_password(&input.password, &user.hashed_password));

                let Some(user) = user else {
                    self.logger.warning("Login failed: Incorrect email or password");
                    return Err(DomainError::validation("Incorrect email or password").into());
                };

                let access = self.issue(&user, TokenPurpose::Access, self.access_ttl)?;
                let refresh = self.issue(&user, TokenPurpose::Refresh, self.refresh_ttl)?;
                Ok(ApiResponse::ok(
                    LoginData {
                        id: user.id.to_string(),
                        access_token: access,
                        refresh_token: refresh,
                        token_type: "Bearer",
                        role: user.role,
                        email: user.email.as_str().to_string(),
                    },
                    "Successfully logged in",
                ))
            })
            .await
    }

    pub async fn signup(&self, input: SignupRequest) -> Result<ApiResponse<SignupData>, ApiError> {
        let call = call_info!("signup_user").in_class(CLASS).arg("signup_data", &input);
        self.logger
            .track_async(call, async {
                let existing = self
                    .users
                    .find_by_email(&input.email)
                    .await
                    .map_err(|e| ApiError::store("signup", e))?;
                if existing.is_some() {
                    return Err(DomainError::conflict("Email already exists").into());
                }

                let user = User::register(&input.name, &input.email, &input.password)?;
                let user = self.users.insert(user).await.map_err(|e| match e {
                    StoreError::Duplicate(_) => DomainError::conflict("Email already exists").into(),
                    other => ApiError::store("signup", other),
                })?;

                Ok(ApiResponse::ok(SignupData::from(&user), "Successfully registered"))
            })
            .await
    }

    pub async fn verify_email(&self, input: VerifyEmailRequest) -> Result<ApiResponse<VerifiedEmailData>, ApiError> {
        let call = call_info!("verify_email").in_class(CLASS).arg("verify_data", &input);
        self.logger
            .track_async(call, async {
                let invalid = || DomainError::validation("Invalid or expired verification token");
                let user_id = self
                    .jwt
                    .verify_purpose(&input.token, TokenPurpose::EmailVerification)
                    .and_then(|claims| claims.user_id)
                    .ok_or_else(invalid)?;

                let mut user = self
                    .users
                    .get(user_id)
                    .await
                    .map_err(|e| ApiError::store("email verification", e))?
                    .ok_or_else(|| DomainError::not_found("User not found"))?;

                if !user.is_email_verified {
                    user.mark_email_verified();
                    user = self
                        .users
                        .update(user)
                        .await
                        .map_err(|e| ApiError::store("email verification", e))?;
                }

                Ok(ApiResponse::ok(
                    VerifiedEmailData {
                        id: user.id.to_string(),
                        email: user.email.as_str().to_string(),
                        is_email_verified: user.is_email_verified,
                    },
                    "Email verified successfully",
                ))
            })
            .await
    }

    /// Single-use token for the email verification link.
    pub fn email_verification_token(&self, user: &User) -> Result<String, ApiError> {
        self.issue(user, TokenPurpose::EmailVerification, self.access_ttl)
    }

    /// Resolve the bearer token to a user admitted by `guard`.
    pub async fn current_user(&self, token: Option<&str>, guard: &UserGuard) -> Result<User, ApiError> {
        let user_id = guard
            .subject(token.map(|t| self.jwt.decode(t)))
            .inspect_err(|e| self.rejected(e))?;

        let user = self
            .users
            .get(user_id)
            .await
            .map_err(|e| ApiError::store("authenticating user", e))?;

        let Some(user) = user else {
            self.rejected(&GuardError::UserNotFound);
            return Err(GuardError::UserNotFound.into());
        };
        guard.admit(Some(user.guard_subject())).inspect_err(|e| self.rejected(e))?;
        Ok(user)
    }

    fn issue(&self, user: &User, purpose: TokenPurpose, ttl: Duration) -> Result<String, ApiError> {
        let claims = AccessClaims::for_user(user.id, user.email.as_str(), user.role, user.is_email_verified, purpose);
        self.jwt
            .issue(claims, ttl)
            .map(|issued| issued.token)
            .map_err(|e| ApiError::internal("issuing token", e.to_string()))
    }

    fn rejected(&self, err: &GuardError) {
        self.helpers.warning(format!("Access rejected: {err}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use habbot_auth::SupportedRole;
    use habbot_infra::InMemoryUserStore;
    use habbot_observability::{LogType, MemorySink};

    struct Fixture {
        service: AuthService,
        users: Arc<InMemoryUserStore>,
        logs: LoggerFactory,
        mem: MemorySink,
    }

    fn fixture() -> Fixture {
        let mem = MemorySink::new();
        let logs = LoggerFactory::builder().sink(mem.clone()).build().unwrap();
        let users = Arc::new(InMemoryUserStore::new());
        let service = AuthService::new(
            users.clone(),
            Arc::new(Hs256Jwt::new("test-secret")),
            Duration::minutes(30),
            Duration::days(7),
            &logs,
        );
        Fixture {
            service,
            users,
            logs,
            mem,
        }
    }

    fn signup(email: &str) -> SignupRequest {
        SignupRequest {
            name: "Ada".into(),
            email: email.into(),
            password: "Str0ng!pass".into(),
        }
    }

    #[tokio::test]
    async fn signup_then_login_issues_both_tokens() {
        let fx = fixture();
        let created = fx.service.signup(signup("ada@example.com")).await.unwrap();
        assert_eq!(created.message.as_deref(), Some("Successfully registered"));

        let login = fx
            .service
            .login(LoginRequest {
                email: "ADA@example.com".into(),
                password: "Str0ng!pass".into(),
            })
            .await
            .unwrap();
        let data = login.data.unwrap();
        assert_eq!(data.token_type, "Bearer");
        assert_eq!(data.role, SupportedRole::User);

        let jwt = Hs256Jwt::new("test-secret");
        assert!(jwt.verify_purpose(&data.access_token, TokenPurpose::Access).is_some());
        assert!(jwt.verify_purpose(&data.refresh_token, TokenPurpose::Refresh).is_some());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let fx = fixture();
        fx.service.signup(signup("ada@example.com")).await.unwrap();

        for (email, password) in [("ada@example.com", "Wr0ng!pass"), ("who@example.com", "Str0ng!pass")] {
            let err = fx
                .service
                .login(LoginRequest {
                    email: email.into(),
                    password: password.into(),
                })
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Incorrect email or password");
        }
    }

    #[tokio::test]
    async fn duplicate_signup_is_a_conflict() {
        let fx = fixture();
        fx.service.signup(signup("ada@example.com")).await.unwrap();
        let err = fx.service.signup(signup("ada@example.com")).await.unwrap_err();
        assert!(matches!(err, ApiError::Domain(DomainError::Conflict(_))));
        assert_eq!(err.to_string(), "Email already exists");
    }

    #[tokio::test]
    async fn tracked_calls_redact_the_password_argument() {
        let fx = fixture();
        fx.service.signup(signup("ada@example.com")).await.unwrap();
        fx.logs.flush();

        let invoke = fx.mem.of_type(LogType::FunctionInvoke);
        assert_eq!(invoke.len(), 1);
        let args = &invoke[0].payload["arguments"]["signup_data"];
        assert_eq!(args["password"], "***redacted***");
        assert_eq!(args["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn verification_marks_the_user_and_guard_admits_after() {
        let fx = fixture();
        let user = User::register("Ada", "ada@example.com", "Str0ng!pass").unwrap();
        fx.users.insert(user.clone()).await.unwrap();

        let token = fx.service.issue(&user, TokenPurpose::Access, Duration::minutes(5)).unwrap();
        let err = fx.service.current_user(Some(&token), &UserGuard::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Guard(GuardError::EmailNotVerified)));

        let link = fx.service.email_verification_token(&user).unwrap();
        let verified = fx.service.verify_email(VerifyEmailRequest { token: link }).await.unwrap();
        assert!(verified.data.unwrap().is_email_verified);

        let current = fx.service.current_user(Some(&token), &UserGuard::default()).await.unwrap();
        assert_eq!(current.id, user.id);
    }

    #[tokio::test]
    async fn access_tokens_cannot_verify_email() {
        let fx = fixture();
        let user = User::register("Ada", "ada@example.com", "Str0ng!pass").unwrap();
        fx.users.insert(user.clone()).await.unwrap();

        let token = fx.service.issue(&user, TokenPurpose::Access, Duration::minutes(5)).unwrap();
        let err = fx.service.verify_email(VerifyEmailRequest { token }).await.unwrap_err();
        assert!(matches!(err, ApiError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn missing_and_unknown_subjects_are_rejected() {
        let fx = fixture();
        let err = fx.service.current_user(None, &UserGuard::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Guard(GuardError::NotAuthenticated)));

        let ghost = User::register("Ghost", "ghost@example.com", "Str0ng!pass").unwrap();
        let token = fx.service.issue(&ghost, TokenPurpose::Access, Duration::minutes(5)).unwrap();
        let err = fx.service.current_user(Some(&token), &UserGuard::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Guard(GuardError::UserNotFound)));
    }
}
