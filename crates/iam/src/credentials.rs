//! Initial passwords for new accounts and how they reach the user.

use uuid::Uuid;

pub trait PasswordGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random password from a v4 UUID: upper-case hex, a dash, lower-case hex.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPasswordGenerator;

impl PasswordGenerator for RandomPasswordGenerator {
    fn generate(&self) -> String {
        let raw = Uuid::new_v4().simple().to_string();
        let (head, tail) = raw.split_at(12);
        format!("{}-{}", head.to_uppercase(), &tail[..12])
    }
}

/// Delivers the initial password of a newly created account.
pub trait CredentialNotifier: Send + Sync {
    fn credentials_issued(&self, email: &str, user_name: &str, password: &str);
}

/// Records that credentials were issued; the password itself is never logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl CredentialNotifier for LogNotifier {
    fn credentials_issued(&self, email: &str, user_name: &str, _password: &str) {
        tracing::info!(email, user_name, "initial credentials issued");
    }
}
