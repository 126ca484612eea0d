//! Identity Context
//!
//! The authenticated caller of the current request, carried in a tokio
//! task-local so services can read it without threading it through every
//! signature. Absent when the request is anonymous or outside a request.

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::auth_service::AccessTokenClaims;

tokio::task_local! {
    static CURRENT_IDENTITY: Option<Arc<IdentityContext>>;
}

/// Two or three letter lowercase language code. Defaults to `en`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(transparent)]
pub struct Language(String);

impl Language {
    pub const DEFAULT: &'static str = "en";

    /// Normalize `code`; `None` when it isn't a plain ISO 639 code
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        // "en-US" style tags keep only the primary subtag
        let primary = code.split(['-', '_']).next().unwrap_or_default();
        let valid = (2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_alphabetic());
        valid.then(|| Self(primary.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Language {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdentityContext {
    pub user_id: String,
    pub username: String,
    pub email: Option<String>,
    /// Numeric role ids
    pub roles: Vec<i64>,
    /// Role codes, used when a role has no numeric id mapping
    pub role_codes: Vec<String>,
    #[schema(value_type = String)]
    pub language: Language,
}

impl IdentityContext {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            email: None,
            roles: Vec::new(),
            role_codes: Vec::new(),
            language: Language::default(),
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = i64>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn with_role_codes<S: Into<String>>(mut self, codes: impl IntoIterator<Item = S>) -> Self {
        self.role_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Build the identity from validated token claims.
    ///
    /// Role ids that are not integers are ignored. Role codes arrive as a
    /// `;`-separated list.
    pub fn from_claims(claims: &AccessTokenClaims) -> Self {
        let roles = claims.roles.iter().filter_map(|r| r.trim().parse::<i64>().ok()).collect();
        let role_codes = split_role_codes(&claims.role_codes);
        let language = claims.lang.as_deref().and_then(Language::parse).unwrap_or_default();

        Self {
            user_id: claims.sub.clone(),
            username: claims.unique_name.clone(),
            email: claims.email.clone().filter(|e| !e.is_empty()),
            roles,
            role_codes,
            language,
        }
    }

    pub fn has_role_code(&self, code: &str) -> bool {
        self.role_codes.iter().any(|c| c.eq_ignore_ascii_case(code))
    }

    /// Identity of the current task, if one was established
    pub fn current() -> Option<Arc<IdentityContext>> {
        CURRENT_IDENTITY.try_with(|identity| identity.clone()).ok().flatten()
    }

    /// Run `fut` with `identity` as the current identity
    pub async fn scope<F: Future>(identity: Option<Arc<IdentityContext>>, fut: F) -> F::Output {
        CURRENT_IDENTITY.scope(identity, fut).await
    }
}

pub fn split_role_codes(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> AccessTokenClaims {
        AccessTokenClaims {
            sub: "0HZXYT2KQ0001".into(),
            unique_name: "jdoe".into(),
            email: Some("jdoe@example.com".into()),
            roles: vec!["1".into(), "abc".into(), " 7 ".into()],
            role_codes: "Admin; Auditor;;".into(),
            lang: Some("FR-ca".into()),
            ..AccessTokenClaims::default()
        }
    }

    #[test]
    fn test_from_claims() {
        let identity = IdentityContext::from_claims(&claims());

        assert_eq!(identity.user_id, "0HZXYT2KQ0001");
        assert_eq!(identity.username, "jdoe");
        assert_eq!(identity.roles, vec![1, 7]);
        assert_eq!(identity.role_codes, vec!["Admin", "Auditor"]);
        assert_eq!(identity.language.as_str(), "fr");
        assert!(identity.has_role_code("admin"));
    }

    #[test]
    fn test_unknown_language_falls_back() {
        let mut c = claims();
        c.lang = Some("klingon".into());
        assert_eq!(IdentityContext::from_claims(&c).language, Language::default());

        c.lang = None;
        assert_eq!(IdentityContext::from_claims(&c).language.as_str(), "en");
    }

    #[tokio::test]
    async fn test_current_is_scoped_to_the_task() {
        assert!(IdentityContext::current().is_none());

        let identity = Arc::new(IdentityContext::new("u1", "alice"));
        let seen = IdentityContext::scope(Some(identity), async {
            IdentityContext::current().map(|i| i.username.clone())
        })
        .await;

        assert_eq!(seen.as_deref(), Some("alice"));
        assert!(IdentityContext::current().is_none());
    }

    async fn username_after_yields(identity: Arc<IdentityContext>) -> Vec<String> {
        IdentityContext::scope(Some(identity), async {
            let mut seen = Vec::new();
            for _ in 0..5 {
                seen.push(IdentityContext::current().map(|i| i.username.clone()).unwrap_or_default());
                tokio::task::yield_now().await;
            }
            seen
        })
        .await
    }

    #[tokio::test]
    async fn test_interleaved_requests_keep_their_own_identity() {
        let (alice, bob) = tokio::join!(
            username_after_yields(Arc::new(IdentityContext::new("u1", "alice"))),
            username_after_yields(Arc::new(IdentityContext::new("u2", "bob"))),
        );

        assert!(alice.iter().all(|name| name == "alice"));
        assert!(bob.iter().all(|name| name == "bob"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_requests_keep_their_own_identity() {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let name = format!("user{}", i);
                let identity = Arc::new(IdentityContext::new(format!("u{}", i), name.clone()));
                tokio::spawn(async move { (name, username_after_yields(identity).await) })
            })
            .collect();

        for handle in handles {
            let (name, seen) = handle.await.unwrap();
            assert!(seen.iter().all(|n| *n == name), "{} saw {:?}", name, seen);
        }
        assert!(IdentityContext::current().is_none());
    }
}
