//! Connection descriptor parsing, editing, and redaction.
//!
//! SQL Server connection strings are loosely structured `key=value;` text
//! with several synonymous keys (`server`/`data source`,
//! `database`/`initial catalog`, `user id`/`uid`, `password`/`pwd`). This
//! module models each recognized part as a closed enum with a dedicated
//! pre-compiled matcher so synonym handling stays testable in isolation.
//!
//! # Security
//! Every operation returns a new string; the input descriptor is never
//! mutated. [`redact`] is the only form of a descriptor that may appear in
//! logs or error messages.

use crate::{Result, error::SqlFleetError};
use regex::Regex;
use std::sync::OnceLock;

/// Recognized connection-string parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPart {
    /// `server=` / `data source=`
    Server,
    /// `database=` / `initial catalog=`
    Database,
    /// `user id=` / `uid=`
    User,
    /// `password=` / `pwd=`
    Password,
    /// `integrated security=` / `trusted_connection=`
    IntegratedSecurity,
    /// `applicationintent=` (read-intent routing for AlwaysOn replicas)
    ApplicationIntent,
}

/// Credentials extracted from a connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Explicit SQL authentication.
    SqlLogin {
        /// Login name.
        user: String,
        /// Login password. Never logged; see [`redact`].
        password: String,
    },
    /// Integrated (trusted) authentication using the calling OS identity.
    Integrated,
}

/// Pre-compiled per-part matchers.
///
/// Uses `OnceLock` for thread-safe lazy initialization.
struct PartPatterns {
    server: Regex,
    database: Regex,
    user: Regex,
    password: Regex,
    integrated: Regex,
    application_intent: Regex,
}

impl PartPatterns {
    fn instance() -> &'static Self {
        static PATTERNS: OnceLock<PartPatterns> = OnceLock::new();
        PATTERNS.get_or_init(Self::compile)
    }

    #[allow(clippy::expect_used)] // patterns are literals, compiled once
    fn compile() -> Self {
        Self {
            server: Regex::new(r"(?i)(server|data source)(\s*=\s*)([^;]+)(;)?")
                .expect("Invalid server pattern"),
            database: Regex::new(r"(?i)(database|initial catalog)(\s*=\s*)([^;]+)(;)?")
                .expect("Invalid database pattern"),
            user: Regex::new(r"(?i)(user id|uid)(\s*=\s*)([^;]+)(;)?")
                .expect("Invalid user pattern"),
            password: Regex::new(r"(?i)(password|pwd)(\s*=\s*)([^;]+)(;)?")
                .expect("Invalid password pattern"),
            integrated: Regex::new(r"(?i)(integrated security|trusted_connection)(\s*=\s*)([^;]+)(;)?")
                .expect("Invalid integrated security pattern"),
            application_intent: Regex::new(r"(?i)(applicationintent)(\s*=\s*)([^;]+)(;)?")
                .expect("Invalid applicationintent pattern"),
        }
    }

    const fn for_part(&self, part: ConnectionPart) -> &Regex {
        match part {
            ConnectionPart::Server => &self.server,
            ConnectionPart::Database => &self.database,
            ConnectionPart::User => &self.user,
            ConnectionPart::Password => &self.password,
            ConnectionPart::IntegratedSecurity => &self.integrated,
            ConnectionPart::ApplicationIntent => &self.application_intent,
        }
    }
}

/// Extracts the value of a connection-string part, if present.
///
/// Returns `None` when the part is absent. Keys are matched
/// case-insensitively and synonyms are honored.
pub fn part(connection_string: &str, part: ConnectionPart) -> Option<String> {
    PartPatterns::instance()
        .for_part(part)
        .captures(connection_string)
        .and_then(|captures| captures.get(3))
        .map(|value| value.as_str().trim().to_string())
}

/// Extracts the authentication clause of a connection descriptor.
///
/// # Errors
/// Returns [`SqlFleetError::MissingCredentials`] when the descriptor has
/// neither a user/password pair nor an integrated-security clause.
pub fn credentials(connection_string: &str) -> Result<Credentials> {
    let user = part(connection_string, ConnectionPart::User);
    let password = part(connection_string, ConnectionPart::Password);
    if let (Some(user), Some(password)) = (user, password) {
        return Ok(Credentials::SqlLogin { user, password });
    }
    if part(connection_string, ConnectionPart::IntegratedSecurity).is_some() {
        return Ok(Credentials::Integrated);
    }
    Err(SqlFleetError::MissingCredentials {
        context: "no user/password pair or integrated security clause found".to_string(),
    })
}

/// Returns a new descriptor with the named part stripped.
///
/// Removing [`ConnectionPart::User`] or [`ConnectionPart::Password`] strips
/// only that clause; use [`to_integrated_security`] to strip the whole
/// authentication block.
pub fn remove_part(connection_string: &str, part: ConnectionPart) -> String {
    let stripped = PartPatterns::instance()
        .for_part(part)
        .replace_all(connection_string, "");
    collapse_separators(&stripped)
}

/// Returns a new descriptor with the named part rewritten to `value`.
///
/// The part is first stripped, then the new clause is prepended, so the
/// operation is idempotent: replacing an already-replaced part yields the
/// same string.
pub fn replace_part(connection_string: &str, part: ConnectionPart, value: &str) -> String {
    let removed = remove_part(connection_string, part);
    let key = match part {
        ConnectionPart::Server => "server",
        ConnectionPart::Database => "database",
        ConnectionPart::User => "user id",
        ConnectionPart::Password => "password",
        ConnectionPart::IntegratedSecurity => "integrated security",
        ConnectionPart::ApplicationIntent => "applicationintent",
    };
    collapse_separators(&format!("{key}={value};{removed}"))
}

/// Returns a new descriptor with the whole authentication block rewritten.
///
/// Strips user, password, and integrated-security clauses, then appends the
/// serialized form of `credentials`.
pub fn replace_credentials(connection_string: &str, credentials: &Credentials) -> String {
    let mut stripped = connection_string.to_string();
    for auth_part in [
        ConnectionPart::User,
        ConnectionPart::Password,
        ConnectionPart::IntegratedSecurity,
    ] {
        stripped = remove_part(&stripped, auth_part);
    }
    let clause = match credentials {
        Credentials::SqlLogin { user, password } => {
            format!("user id={user};password={password};")
        }
        Credentials::Integrated => "integrated security=SSPI;".to_string(),
    };
    collapse_separators(&format!("{stripped};{clause}"))
}

/// Width of the password mask emitted by [`redact`].
const PASSWORD_MASK: &str = "****************";

/// Returns the descriptor with the password replaced by a fixed-width mask.
///
/// The mask width is independent of the real password length so the
/// redacted form leaks nothing about the credential. Descriptors using
/// integrated security are returned unchanged.
///
/// # Errors
/// Returns [`SqlFleetError::MissingAuthentication`] when the descriptor
/// declares no authentication at all: a connection string must always carry
/// some auth clause to be usable, so an unauthenticated one is reported
/// rather than silently passed through.
pub fn redact(connection_string: &str) -> Result<String> {
    match credentials(connection_string) {
        Ok(Credentials::SqlLogin { .. }) => {
            // In-place rewrite: the redacted string differs from the input
            // only in the password value.
            let masked = PartPatterns::instance().password.replace(
                connection_string,
                format!("${{1}}${{2}}{PASSWORD_MASK}${{4}}"),
            );
            Ok(masked.into_owned())
        }
        Ok(Credentials::Integrated) => Ok(connection_string.to_string()),
        Err(_) => Err(SqlFleetError::MissingAuthentication),
    }
}

/// Redacts a descriptor for logging, falling back to a constant marker.
///
/// Used on error paths where redaction itself may fail; the raw descriptor
/// is never the fallback.
pub fn redact_lossy(connection_string: &str) -> String {
    redact(connection_string).unwrap_or_else(|_| "<unauthenticated descriptor>".to_string())
}

/// Converts a descriptor to integrated security.
///
/// Strips all explicit-credential clauses (user, password, integrated,
/// trusted) and appends a canonical `Integrated Security=SSPI;` clause.
/// With `strip_database` set, database/catalog clauses are removed too,
/// for probing server-level settings without database access rights.
/// Applying the conversion twice yields the same string as applying it once.
pub fn to_integrated_security(connection_string: &str, strip_database: bool) -> String {
    let mut stripped = connection_string.to_string();
    for auth_part in [
        ConnectionPart::User,
        ConnectionPart::Password,
        ConnectionPart::IntegratedSecurity,
    ] {
        stripped = remove_part(&stripped, auth_part);
    }
    if strip_database {
        stripped = remove_part(&stripped, ConnectionPart::Database);
    }
    let stripped = stripped.trim_end_matches(';');
    collapse_separators(&format!("{stripped};Integrated Security=SSPI;"))
}

/// Builds a descriptor from its parts.
pub fn from_parts(server: &str, database: &str, credentials: &Credentials) -> String {
    let auth = match credentials {
        Credentials::SqlLogin { user, password } => {
            format!("user id={user};password={password};")
        }
        Credentials::Integrated => "integrated security=SSPI;".to_string(),
    };
    format!("server={server};database={database};{auth}")
}

/// Collapses duplicate `;` separators and strips a leading separator.
fn collapse_separators(connection_string: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)] // pattern is a literal, compiled once
    let separators = SEPARATORS.get_or_init(|| Regex::new(r";{2,}").expect("Invalid separator pattern"));
    separators
        .replace_all(connection_string, ";")
        .trim_start_matches(';')
        .to_string()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const CONN: &str = "server=sql01;database=orders;user id=svc_deploy;password=hunter2;";

    #[test]
    fn test_part_extraction_with_synonyms() {
        assert_eq!(part(CONN, ConnectionPart::Server).unwrap(), "sql01");
        assert_eq!(part(CONN, ConnectionPart::Database).unwrap(), "orders");

        let synonyms = "Data Source=sql02;Initial Catalog=billing;Integrated Security=SSPI;";
        assert_eq!(part(synonyms, ConnectionPart::Server).unwrap(), "sql02");
        assert_eq!(part(synonyms, ConnectionPart::Database).unwrap(), "billing");
        assert_eq!(part(CONN, ConnectionPart::ApplicationIntent), None);
    }

    #[test]
    fn test_credentials_extraction() {
        assert_eq!(
            credentials(CONN).unwrap(),
            Credentials::SqlLogin {
                user: "svc_deploy".to_string(),
                password: "hunter2".to_string()
            }
        );
        assert_eq!(
            credentials("server=s;trusted_connection=yes;").unwrap(),
            Credentials::Integrated
        );
        assert!(matches!(
            credentials("server=s;database=d;"),
            Err(SqlFleetError::MissingCredentials { .. })
        ));
    }

    #[test]
    fn test_replace_then_extract_round_trip() {
        for (target, value) in [
            (ConnectionPart::Server, "sql09"),
            (ConnectionPart::Database, "archive"),
            (ConnectionPart::ApplicationIntent, "readonly"),
        ] {
            let replaced = replace_part(CONN, target, value);
            assert_eq!(part(&replaced, target).unwrap(), value);
            // Idempotent: replacing again yields the same string.
            assert_eq!(replace_part(&replaced, target, value), replaced);
        }
    }

    #[test]
    fn test_remove_part_collapses_separators() {
        let removed = remove_part(CONN, ConnectionPart::Database);
        assert_eq!(part(&removed, ConnectionPart::Database), None);
        assert!(!removed.contains(";;"));
        assert_eq!(part(&removed, ConnectionPart::Server).unwrap(), "sql01");
    }

    #[test]
    fn test_replace_credentials_pair_and_clause() {
        let swapped = replace_credentials(
            CONN,
            &Credentials::SqlLogin {
                user: "other".to_string(),
                password: "pass2".to_string(),
            },
        );
        assert_eq!(part(&swapped, ConnectionPart::User).unwrap(), "other");
        assert_eq!(part(&swapped, ConnectionPart::Password).unwrap(), "pass2");

        let integrated = replace_credentials(CONN, &Credentials::Integrated);
        assert_eq!(credentials(&integrated).unwrap(), Credentials::Integrated);
        assert_eq!(part(&integrated, ConnectionPart::Password), None);
    }

    #[test]
    fn test_redact_masks_password() {
        let redacted = redact(CONN).unwrap();
        assert!(!redacted.contains("hunter2"));
        assert_eq!(
            part(&redacted, ConnectionPart::Password).unwrap(),
            PASSWORD_MASK
        );
        // Identical to the input apart from the masked password.
        assert_eq!(redacted.replace(PASSWORD_MASK, "hunter2"), CONN);
        // Mask width is fixed regardless of the real password length.
        let long = "server=s;user id=u;password=averyveryverylongpassword;";
        assert_eq!(
            part(&redact(long).unwrap(), ConnectionPart::Password).unwrap(),
            PASSWORD_MASK
        );
    }

    #[test]
    fn test_redact_requires_authentication() {
        assert!(matches!(
            redact("server=s;database=d;"),
            Err(SqlFleetError::MissingAuthentication)
        ));
        // Integrated descriptors pass through untouched.
        let integrated = "server=s;integrated security=SSPI;";
        assert_eq!(redact(integrated).unwrap(), integrated);
    }

    #[test]
    fn test_to_integrated_security_idempotent() {
        let once = to_integrated_security(CONN, false);
        assert!(!once.contains("hunter2"));
        assert!(!once.contains("svc_deploy"));
        assert_eq!(credentials(&once).unwrap(), Credentials::Integrated);
        assert_eq!(part(&once, ConnectionPart::Database).unwrap(), "orders");
        assert_eq!(to_integrated_security(&once, false), once);
    }

    #[test]
    fn test_to_integrated_security_strip_database() {
        let server_only = to_integrated_security(CONN, true);
        assert_eq!(part(&server_only, ConnectionPart::Database), None);
        assert_eq!(part(&server_only, ConnectionPart::Server).unwrap(), "sql01");
    }

    #[test]
    fn test_from_parts_round_trips() {
        let built = from_parts(
            "sql01",
            "orders",
            &Credentials::SqlLogin {
                user: "u".to_string(),
                password: "p".to_string(),
            },
        );
        assert_eq!(part(&built, ConnectionPart::Server).unwrap(), "sql01");
        assert_eq!(
            credentials(&built).unwrap(),
            Credentials::SqlLogin {
                user: "u".to_string(),
                password: "p".to_string()
            }
        );
    }
}
