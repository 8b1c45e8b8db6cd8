use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::{ServiceError, Wgcfg};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

impl Wgcfg {
    /// Mints a bearer capability for `subject`. Who may ask for one is
    /// decided outside this service.
    #[instrument(skip(self))]
    pub fn issue_token(&self, subject: &str) -> Result<String, ServiceError> {
        if subject.is_empty() {
            return Err(ServiceError::AccessDenied);
        }
        let claims = Claims {
            sub: subject.to_owned(),
            exp: (OffsetDateTime::now_utc() + self.token_ttl).unix_timestamp(),
        };
        Ok(claims.sign_with_key(&self.hmac_key)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, ServiceError> {
        let claims: Claims = token.verify_with_key(&self.hmac_key)?;
        if claims.sub.is_empty() || claims.exp <= OffsetDateTime::now_utc().unix_timestamp() {
            debug!(sub = %claims.sub, "rejected expired token");
            return Err(ServiceError::AccessDenied);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use crate::{process::fake::ScriptedRunner, service::testing::service};

    #[test]
    fn issued_token_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), ScriptedRunner::new());

        let token = service.issue_token("admin").unwrap();
        assert_eq!(service.verify_token(&token).unwrap().sub, "admin");
    }

    #[test]
    fn expired_token_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), ScriptedRunner::new());
        let service = service.with_token_ttl(time::Duration::minutes(-1));

        let token = service.issue_token("admin").unwrap();
        assert_eq!(service.verify_token(&token).unwrap_err().kind(), "AccessDenied");
    }

    #[test]
    fn foreign_or_garbled_token_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), ScriptedRunner::new());

        let mut token = service.issue_token("admin").unwrap();
        token.push('x');
        assert_eq!(service.verify_token(&token).unwrap_err().kind(), "InvalidToken");
        assert_eq!(service.verify_token("nope").unwrap_err().kind(), "InvalidToken");
    }
}
