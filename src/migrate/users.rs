//! Redmine user -> GitLab account routing.

use crate::config::UserSettings;
use crate::model::UserRef;
use std::collections::HashSet;
use tracing::{info, warn};

/// Outcome of resolving one Redmine user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub account_id: u64,
    /// The user had no mapping and was routed to the default account.
    pub defaulted: bool,
}

#[derive(Debug, Clone)]
pub struct UserResolver {
    settings: UserSettings,
    warned: HashSet<u64>,
    announced: HashSet<u64>,
}

impl UserResolver {
    #[must_use]
    pub fn new(settings: &UserSettings) -> Self {
        Self {
            settings: settings.clone(),
            warned: HashSet::new(),
            announced: HashSet::new(),
        }
    }

    /// Never fails: unmapped users fall back to the default account.
    pub fn resolve(&mut self, user: &UserRef) -> Resolution {
        if let Some(account_id) = self.settings.mapped_account(user.id) {
            if self.announced.insert(user.id) {
                info!(source_user = user.id, name = %user.name, account_id, "Found user");
            }
            return Resolution {
                account_id,
                defaulted: false,
            };
        }
        if self.warned.insert(user.id) {
            warn!(
                source_user = user.id,
                name = %user.name,
                default_account = self.settings.default_account,
                "User not found in conversion table, using default account"
            );
        }
        Resolution {
            account_id: self.settings.default_account,
            defaulted: true,
        }
    }

    #[must_use]
    pub const fn default_account(&self) -> u64 {
        self.settings.default_account
    }

    /// Distinct unmapped users seen so far.
    #[must_use]
    pub fn warnings(&self) -> usize {
        self.warned.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountRef;

    fn user(id: u64) -> UserRef {
        UserRef {
            id,
            name: format!("user {id}"),
        }
    }

    fn settings() -> UserSettings {
        let mut settings = UserSettings {
            default_account: 9,
            ..UserSettings::default()
        };
        settings.conversion.insert(1, Some(AccountRef::Id(41)));
        settings.conversion.insert(2, Some(AccountRef::Text(String::new())));
        settings.conversion.insert(3, None);
        settings
    }

    #[test]
    fn mapped_and_empty_entries() {
        let mut resolver = UserResolver::new(&settings());
        assert_eq!(
            resolver.resolve(&user(1)),
            Resolution {
                account_id: 41,
                defaulted: false
            }
        );
        for id in [2, 3, 4] {
            assert_eq!(
                resolver.resolve(&user(id)),
                Resolution {
                    account_id: 9,
                    defaulted: true
                }
            );
        }
    }

    #[test]
    fn warns_once_per_user() {
        let mut resolver = UserResolver::new(&settings());
        for _ in 0..5 {
            resolver.resolve(&user(7));
        }
        resolver.resolve(&user(8));
        resolver.resolve(&user(1));
        assert_eq!(resolver.warnings(), 2);
    }
}
