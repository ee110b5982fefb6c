//! Integration tests for nova-authenticator.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use nova_authenticator::{
    AttemptLimiter, AttemptTracker, AttestationError, Attestor, Config, DirectoryError, Instance,
    InstanceDirectory, Issuer, Role, RoleRegistry, SigningKey, StaticDirectory, TokenError,
    Verifier, VerifyingKey,
};
use url::Url;

const PRIVATE_PEM: &[u8] = include_bytes!("fixtures/signing_key.pem");
const PUBLIC_PEM: &[u8] = include_bytes!("fixtures/signing_key.pub.pem");

fn issuer_url() -> Url {
    Url::parse("https://auth.example.com/").unwrap()
}

fn instance(id: &str, created: DateTime<Utc>) -> Instance {
    Instance {
        id: id.to_string(),
        name: format!("{id}-name"),
        project_id: "p-1".to_string(),
        user_id: "u-1".to_string(),
        addresses: BTreeSet::from(["10.0.0.1".to_string(), "2001:db8::1".to_string()]),
        metadata: HashMap::from([
            ("env".to_string(), "prod".to_string()),
            ("team".to_string(), "x".to_string()),
        ]),
        status: "ACTIVE".to_string(),
        created,
        updated: created,
    }
}

fn roles() -> RoleRegistry {
    RoleRegistry::from_iter([
        (
            "web".to_string(),
            Role::new().project_id("p-1").require_metadata("env", "prod"),
        ),
        ("open".to_string(), Role::new()),
    ])
}

fn issuer(lifetime: Duration) -> Issuer {
    Issuer::new(
        issuer_url(),
        SigningKey::from_pem(PRIVATE_PEM).unwrap(),
        lifetime,
    )
}

fn verifier() -> Verifier {
    Verifier::new(issuer_url(), VerifyingKey::from_pem(PUBLIC_PEM).unwrap())
}

#[test]
fn attest_then_issue_round_trip() {
    // Arrange
    let now = Utc::now();
    let created = now - ChronoDuration::seconds(10);
    let attestor = Attestor::new(
        StaticDirectory::new().with_instance(instance("i-1", created)),
        roles(),
        AttemptTracker::new(3),
        Duration::from_secs(300),
    );
    let issuer = issuer(Duration::from_secs(600));

    // Act
    let verified = attestor.attest_at("i-1", "web", "10.0.0.1", now).unwrap();
    let token = issuer.issue_at(&verified, "web", now).unwrap();
    let claims = verifier().verify_for_role(&token, "web").unwrap();

    // Assert
    assert_eq!(claims.sub, "i-1");
    assert_eq!(claims.iss, "https://auth.example.com/");
    assert_eq!(claims.aud, "https://auth.example.com/roles/web");
    assert_eq!(claims.iat, now.timestamp());
    assert_eq!(claims.exp - claims.iat, 600);
    assert_eq!(claims.instance_name.as_deref(), Some("i-1-name"));
}

#[test]
fn payload_carries_exactly_the_documented_fields() {
    let now = Utc::now();
    let mut unnamed = instance("i-1", now);
    unnamed.name = String::new();

    let token = issuer(Duration::from_secs(60))
        .issue_at(&unnamed, "open", now)
        .unwrap();

    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.validate_aud = false;
    let decoded = jsonwebtoken::decode::<serde_json::Value>(
        &token,
        &jsonwebtoken::DecodingKey::from_rsa_pem(PUBLIC_PEM).unwrap(),
        &validation,
    )
    .unwrap();

    let mut fields: Vec<&str> = decoded
        .claims
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["aud", "exp", "iat", "iss", "sub"]);
    assert!(decoded.claims["aud"].is_string());
}

#[test]
fn scenario_period_of_five_minutes_sets_deadline() {
    let now = Utc::now();
    let created = now - ChronoDuration::seconds(10);
    let attestor = Attestor::new(
        StaticDirectory::new().with_instance(instance("i-1", created)),
        roles(),
        AttemptTracker::new(3),
        Duration::from_secs(300),
    );

    attestor.attest_at("i-1", "web", "10.0.0.1", now).unwrap();

    assert_eq!(
        attestor.limiter().deadline("i-1"),
        Some(created + ChronoDuration::minutes(5))
    );
}

#[test]
fn scenario_zero_period_always_fails() {
    let now = Utc::now();
    let attestor = Attestor::new(
        StaticDirectory::new().with_instance(instance("i-1", now - ChronoDuration::seconds(1))),
        roles(),
        AttemptTracker::new(3),
        Duration::ZERO,
    );

    let result = attestor.attest_at("i-1", "web", "10.0.0.1", now);

    assert!(matches!(
        result,
        Err(AttestationError::PeriodExceeded { .. })
    ));
}

#[test]
fn scenario_limit_two_rejects_third_attempt() {
    let now = Utc::now();
    let attestor = Attestor::new(
        StaticDirectory::new().with_instance(instance("i-1", now)),
        roles(),
        AttemptTracker::new(2),
        Duration::from_secs(300),
    );

    let results: Vec<_> = (0..3)
        .map(|_| attestor.attest_at("i-1", "web", "10.0.0.1", now))
        .collect();

    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert_eq!(
        results[2],
        Err(AttestationError::TooManyAttempts { count: 3, limit: 2 })
    );
}

#[test]
fn scenario_foreign_address_is_rejected() {
    let now = Utc::now();
    let attestor = Attestor::new(
        StaticDirectory::new().with_instance(instance("i-1", now)),
        roles(),
        AttemptTracker::new(3),
        Duration::from_secs(300),
    );

    let result = attestor.attest_at("i-1", "web", "10.0.0.2", now);

    assert_eq!(
        result,
        Err(AttestationError::AddressMismatch {
            remote_addr: "10.0.0.2".to_string()
        })
    );
}

#[test]
fn over_limit_instance_is_rejected_until_its_period_ends() {
    let created = Utc::now();
    let attestor = Attestor::new(
        StaticDirectory::new().with_instance(instance("i-1", created)),
        roles(),
        AttemptTracker::new(1),
        Duration::from_secs(300),
    );

    assert!(attestor.attest_at("i-1", "web", "10.0.0.1", created).is_ok());
    for minute in 1..5 {
        let now = created + ChronoDuration::minutes(minute);
        assert!(matches!(
            attestor.attest_at("i-1", "web", "10.0.0.1", now),
            Err(AttestationError::TooManyAttempts { .. })
        ));
    }

    let after = created + ChronoDuration::minutes(6);
    assert!(matches!(
        attestor.attest_at("i-1", "web", "10.0.0.1", after),
        Err(AttestationError::PeriodExceeded { .. })
    ));
    assert_eq!(attestor.limiter().purge_expired(after), 1);
    assert!(matches!(
        attestor.attest_at("i-1", "web", "10.0.0.1", after),
        Err(AttestationError::PeriodExceeded { .. })
    ));
}

/// Directory that answers slowly and purges the shared tracker before
/// answering.
struct PurgingSlowDirectory {
    inner: StaticDirectory,
    tracker: Arc<AttemptTracker>,
    delay: Duration,
}

impl InstanceDirectory for PurgingSlowDirectory {
    fn get_instance(&self, instance_id: &str) -> Result<Instance, DirectoryError> {
        std::thread::sleep(self.delay);
        self.tracker.purge_expired(Utc::now());
        self.inner.get_instance(instance_id)
    }
}

#[test]
fn deadline_passing_during_slow_lookup_is_enforced() {
    // Arrange
    let period = Duration::from_secs(300);
    let created = Utc::now() - ChronoDuration::from_std(period).unwrap()
        + ChronoDuration::milliseconds(300);
    let deadline = created + ChronoDuration::from_std(period).unwrap();
    let tracker = Arc::new(AttemptTracker::new(1));
    tracker.record_attempt("i-1", deadline, Utc::now());
    tracker.record_attempt("i-1", deadline, Utc::now());
    let attestor = Attestor::new(
        PurgingSlowDirectory {
            inner: StaticDirectory::new().with_instance(instance("i-1", created)),
            tracker: Arc::clone(&tracker),
            delay: Duration::from_millis(600),
        },
        roles(),
        Arc::clone(&tracker),
        period,
    );

    // Act
    let result = attestor.attest("i-1", "web", "10.0.0.1");

    // Assert
    assert!(matches!(
        result,
        Err(AttestationError::PeriodExceeded { .. })
    ));
    assert_eq!(tracker.attempts("i-1"), None);
}

#[test]
fn slow_lookup_inside_period_still_counts_attempts() {
    // Arrange
    let created = Utc::now();
    let tracker = Arc::new(AttemptTracker::new(1));
    let attestor = Attestor::new(
        PurgingSlowDirectory {
            inner: StaticDirectory::new().with_instance(instance("i-1", created)),
            tracker: Arc::clone(&tracker),
            delay: Duration::from_millis(20),
        },
        roles(),
        Arc::clone(&tracker),
        Duration::from_secs(300),
    );

    // Act
    let first = attestor.attest("i-1", "web", "10.0.0.1");
    let second = attestor.attest("i-1", "web", "10.0.0.1");

    // Assert
    assert!(first.is_ok());
    assert_eq!(
        second,
        Err(AttestationError::TooManyAttempts { count: 2, limit: 1 })
    );
    assert_eq!(tracker.attempts("i-1"), Some(2));
}

#[test]
fn concurrent_attestations_share_one_limit() {
    let now = Utc::now();
    let attestor = Arc::new(Attestor::new(
        StaticDirectory::new().with_instance(instance("i-1", now)),
        roles(),
        AttemptTracker::new(5),
        Duration::from_secs(300),
    ));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let attestor = Arc::clone(&attestor);
            std::thread::spawn(move || attestor.attest_at("i-1", "web", "10.0.0.1", now).is_ok())
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 5);
    assert_eq!(attestor.limiter().attempts("i-1"), Some(20));
}

#[test]
fn expired_token_is_rejected_by_verifier() {
    let now = Utc::now();
    let token = issuer(Duration::from_secs(60))
        .issue_at(&instance("i-1", now), "web", now - ChronoDuration::hours(1))
        .unwrap();

    assert_eq!(verifier().verify(&token), Err(TokenError::TokenExpired));
}

#[test]
fn config_builds_working_pipeline() {
    let config = Config::from_yaml_str(
        r#"
auth:
  limit: 2
  period: 5m
  signingKeyFile: tests/fixtures/signing_key.pem
  tokenIssuer: https://auth.example.com/
  tokenExpiry: 15m
roles:
  web:
    projectID: p-1
    metadata:
      env: prod
"#,
    )
    .unwrap();
    let now = Utc::now();
    let attestor =
        config.build_attestor(StaticDirectory::new().with_instance(instance("i-1", now)));
    let issuer = config.build_issuer().unwrap();

    let verified = attestor.attest("i-1", "web", "10.0.0.1").unwrap();
    let token = issuer.new_token(&verified, "web").unwrap();
    let claims = verifier().verify_for_role(&token, "web").unwrap();

    assert_eq!(claims.exp - claims.iat, 900);
    assert!(matches!(
        attestor.attest("i-1", "open", "10.0.0.1"),
        Err(AttestationError::UnknownRole { .. })
    ));
}
