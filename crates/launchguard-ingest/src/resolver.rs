use launchguard_core::types::{AccountKeys, LoadedAddresses, ParticipantSet};
use tracing::trace;

/// Resolves one transaction's account keys into a single ordered set.
///
/// Static (or legacy) keys come first, then loaded-writable, then
/// loaded-readonly. A versioned transaction whose loaded addresses were
/// trimmed by the data source resolves to its static keys alone.
pub fn resolve_account_keys(keys: &AccountKeys) -> ParticipantSet {
    match keys {
        AccountKeys::Legacy(keys) => resolve_legacy(keys),
        AccountKeys::Versioned { static_keys, loaded } => {
            resolve_versioned(static_keys, loaded.as_ref())
        }
    }
}

fn resolve_legacy(keys: &[String]) -> ParticipantSet {
    keys.iter().cloned().collect()
}

fn resolve_versioned(static_keys: &[String], loaded: Option<&LoadedAddresses>) -> ParticipantSet {
    let mut set: ParticipantSet = static_keys.iter().cloned().collect();
    match loaded {
        Some(loaded) => {
            set.extend(loaded.writable.iter().cloned());
            set.extend(loaded.readonly.iter().cloned());
        }
        None => {
            trace!(
                static_keys = static_keys.len(),
                "Loaded addresses missing, resolving static keys only"
            );
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn legacy_keys_are_returned_unchanged() {
        let input = keys("legacy", 6);
        let resolved = resolve_account_keys(&AccountKeys::Legacy(input.clone()));
        assert_eq!(resolved.as_slice(), input.as_slice());
    }

    #[test]
    fn versioned_keys_concatenate_static_writable_readonly() {
        let static_keys = keys("s", 3);
        let writable = keys("w", 2);
        let readonly = keys("r", 4);
        let resolved = resolve_account_keys(&AccountKeys::Versioned {
            static_keys: static_keys.clone(),
            loaded: Some(LoadedAddresses {
                writable: writable.clone(),
                readonly: readonly.clone(),
            }),
        });

        assert_eq!(resolved.len(), 3 + 2 + 4);
        let expected: Vec<String> = static_keys
            .into_iter()
            .chain(writable)
            .chain(readonly)
            .collect();
        assert_eq!(resolved.as_slice(), expected.as_slice());
    }

    #[test]
    fn trimmed_versioned_response_falls_back_to_static_keys() {
        let static_keys = keys("s", 5);
        let resolved = resolve_account_keys(&AccountKeys::Versioned {
            static_keys: static_keys.clone(),
            loaded: None,
        });
        assert_eq!(resolved.as_slice(), static_keys.as_slice());
    }

    #[test]
    fn repeated_keys_are_kept_once_in_first_seen_position() {
        let resolved = resolve_account_keys(&AccountKeys::Versioned {
            static_keys: vec!["payer".into(), "program".into()],
            loaded: Some(LoadedAddresses {
                writable: vec!["pool".into(), "payer".into()],
                readonly: vec!["program".into(), "clock".into()],
            }),
        });
        assert_eq!(resolved.as_slice(), &["payer", "program", "pool", "clock"]);
    }
}
