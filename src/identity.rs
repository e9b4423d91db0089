//! Author identity resolution (§6 Environment): `SUDO_USER`/`SUDO_UID`
//! takes priority; otherwise the invoking user's name and UID.

use std::env;

#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub uid: u32,
}

fn parse_uid(var: &str) -> Option<u32> {
    env::var(var).ok()?.parse().ok()
}

/// Resolves the identity to stamp onto a new commit. `SUDO_USER`/`SUDO_UID`
/// wins when a command runs under `sudo`; otherwise falls back to
/// `$USER`/`$LOGNAME`. No raw UID syscall is made (no `libc` dependency is
/// in scope here); an unresolvable UID is recorded as 0.
pub fn resolve() -> Identity {
    if let Ok(name) = env::var("SUDO_USER") {
        if !name.is_empty() {
            let uid = parse_uid("SUDO_UID").unwrap_or(0);
            return Identity { name, uid };
        }
    }

    let name = env::var("USER")
        .or_else(|_| env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    Identity { name, uid: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sudo_user_takes_priority() {
        env::set_var("SUDO_USER", "alice");
        env::set_var("SUDO_UID", "1001");
        let id = resolve();
        assert_eq!(id.name, "alice");
        assert_eq!(id.uid, 1001);
        env::remove_var("SUDO_USER");
        env::remove_var("SUDO_UID");
    }
}
