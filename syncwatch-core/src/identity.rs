use crate::{Config, Id};

/// Marker for the identity of a transport connection.
pub enum Connection {}

/// Identifies one client connection. Members are keyed by this,
/// so two tabs of the same person are two distinct members.
pub type ConnectionId = Id<Connection>;

/// The already-authenticated identity a connection acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub admin: bool,
}

impl Principal {
    pub fn new(id: impl Into<String>, config: &Config) -> Self {
        let id = id.into();
        let admin = config.is_admin(&id);

        Self { id, admin }
    }

    /// A principal for a connection that didn't present an identity.
    pub fn anonymous(connection: ConnectionId) -> Self {
        Self {
            id: format!("guest-{connection}"),
            admin: false,
        }
    }

    /// Uses the supplied identity if it is non-empty, otherwise falls back to an anonymous one.
    pub fn resolve(identity: Option<&str>, connection: ConnectionId, config: &Config) -> Self {
        match identity.map(str::trim).filter(|i| !i.is_empty()) {
            Some(identity) => Self::new(identity, config),
            None => Self::anonymous(connection),
        }
    }

    /// Returns true if this principal may manage a session owned by `owner`.
    pub fn can_manage(&self, owner: &str) -> bool {
        self.admin || self.id == owner
    }
}

#[cfg(test)]
mod test {
    use super::{ConnectionId, Principal};
    use crate::Config;

    #[test]
    fn resolve_falls_back_to_anonymous() {
        let config = Config::default();
        let connection = ConnectionId::new();

        let anonymous = Principal::resolve(Some("  "), connection, &config);
        assert_eq!(anonymous.id, format!("guest-{connection}"));

        let named = Principal::resolve(Some("alice"), connection, &config);
        assert_eq!(named.id, "alice");
        assert!(!named.admin);
    }

    #[test]
    fn admins_manage_everything() {
        let config = Config {
            admins: vec!["root".into()],
            ..Default::default()
        };

        let root = Principal::new("root", &config);
        let bob = Principal::new("bob", &config);

        assert!(root.can_manage("alice"));
        assert!(bob.can_manage("bob"));
        assert!(!bob.can_manage("alice"));
    }
}
