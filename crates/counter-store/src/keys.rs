//! Canonical key schema for every record the control plane persists.
//!
//! All components address shared state through these helpers so that no
//! two components can disagree about where a record lives.

use pacekeeper_core_types::{ActionClass, EndpointId, JobId, UserId};

/// Roster of users with automation currently enabled.
pub const AUTOMATING: &str = "automating";

pub const STOP_PREFIX: &str = "stop:";

/// Rolling 24h outcome log for one user.
pub fn outcomes(user: &UserId) -> String {
    format!("outcomes:{}", user.0)
}

pub fn breaker(endpoint: &EndpointId) -> String {
    format!("breaker:{}", endpoint.0)
}

pub fn stop(user: &UserId) -> String {
    format!("{}{}", STOP_PREFIX, user.0)
}

/// Recent emergency-stop history ring, consulted by pre-resume checks.
pub fn stop_history(user: &UserId) -> String {
    format!("stop_history:{}", user.0)
}

pub fn safety(user: &UserId) -> String {
    format!("safety:{}", user.0)
}

pub fn alerts(user: &UserId) -> String {
    format!("alerts:{}", user.0)
}

pub fn job(id: &JobId) -> String {
    format!("job:{}", id.0)
}

/// Per-class queue index; entries carry the owning user.
pub fn queue(class: ActionClass) -> String {
    format!("queue:{}", class.as_str())
}

/// Last-processed timestamp used for inter-action pacing.
pub fn pace(user: &UserId, class: ActionClass) -> String {
    format!("pace:{}:{}", user.0, class.as_str())
}

/// Cross-process execution lease for one (user, class) lane.
pub fn lease(user: &UserId, class: ActionClass) -> String {
    format!("lease:{}:{}", user.0, class.as_str())
}

/// Per-user limits override map written by the admin surface.
pub fn limits_override(user: &UserId) -> String {
    format!("limits:{}", user.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_disjoint_per_user() {
        let a = UserId::new();
        let b = UserId::new();
        assert_ne!(outcomes(&a), outcomes(&b));
        assert_ne!(stop(&a), stop(&b));
        assert!(stop(&a).starts_with(STOP_PREFIX));
        assert_eq!(stop(&UserId::system()), "stop:__system__");
    }

    #[test]
    fn class_keys_embed_the_class() {
        let user = UserId::new();
        assert!(lease(&user, ActionClass::Connection).ends_with(":connection"));
        assert_eq!(queue(ActionClass::ProfileView), "queue:profile_view");
    }
}
