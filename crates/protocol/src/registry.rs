use std::collections::HashMap;
use std::sync::RwLock;

/// Errors returned by [`CommandRegistry`] mutation methods.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("command id {0} is already registered")]
    DuplicateId(u16),

    #[error("command name {0:?} is already registered")]
    DuplicateName(String),

    #[error("no command registered with id {0}")]
    UnknownId(u16),

    #[error("no command registered with name {0:?}")]
    UnknownName(String),
}

struct Entry<H> {
    name: String,
    handler: H,
}

/// Thread-safe map from a numeric command id to a `(name, handler)` pair.
///
/// Reads take a shared lock; mutations take an exclusive lock. Names and
/// ids are each unique across the registry. `H` is the handler type — the
/// registry itself has no opinion on its signature, so callers can use it
/// both for the vanilla command handlers (`Fn(&Session, &Stream)`) and in
/// tests with simpler stand-ins.
pub struct CommandRegistry<H> {
    entries: RwLock<HashMap<u16, Entry<H>>>,
}

impl<H> Default for CommandRegistry<H> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<H: Clone> CommandRegistry<H> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under `id`/`name`.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateId`] or
    /// [`RegistryError::DuplicateName`] if either is already registered.
    pub fn add(&self, id: u16, name: impl Into<String>, handler: H) -> Result<(), RegistryError> {
        let name = name.into();
        let mut entries = self.entries.write().expect("registry lock poisoned");

        if entries.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        if entries.values().any(|e| e.name == name) {
            return Err(RegistryError::DuplicateName(name));
        }

        entries.insert(id, Entry { name, handler });
        Ok(())
    }

    /// Removes the command registered under `id`.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownId`] if no such command is registered.
    pub fn remove(&self, id: u16) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        entries.remove(&id).map(|_| ()).ok_or(RegistryError::UnknownId(id))
    }

    /// Removes the command registered under `name`.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownName`] if no such command is
    /// registered.
    pub fn remove_by_name(&self, name: &str) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        let id = entries
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| RegistryError::UnknownName(name.to_string()))?;
        entries.remove(&id);
        Ok(())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.read().expect("registry lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[must_use]
    pub fn exists(&self, id: u16) -> bool {
        self.entries.read().expect("registry lock poisoned").contains_key(&id)
    }

    #[must_use]
    pub fn exists_by_name(&self, name: &str) -> bool {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .values()
            .any(|e| e.name == name)
    }

    /// Snapshot of `id -> name` for every registered command.
    #[must_use]
    pub fn command_list(&self) -> Vec<(u16, String)> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|(id, entry)| (*id, entry.name.clone()))
            .collect()
    }

    /// Clones and returns the handler registered under `id`.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownId`] if no such command is
    /// registered.
    pub fn get(&self, id: u16) -> Result<H, RegistryError> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(&id)
            .map(|e| e.handler.clone())
            .ok_or(RegistryError::UnknownId(id))
    }

    /// Merges every entry of `other` into `self`.
    ///
    /// # Errors
    /// Returns the first duplicate id/name conflict encountered; `self` is
    /// left with whichever entries were already merged before the conflict.
    pub fn merge(&self, other: &Self) -> Result<(), RegistryError> {
        for (id, name) in other.command_list() {
            let handler = other.get(id)?;
            self.add(id, name, handler)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_rejects_duplicate_id_and_name() {
        let registry: CommandRegistry<u8> = CommandRegistry::new();
        registry.add(1, "ONE", 10).unwrap();

        assert_eq!(registry.add(1, "OTHER", 20), Err(RegistryError::DuplicateId(1)));
        assert_eq!(
            registry.add(2, "ONE", 20),
            Err(RegistryError::DuplicateName("ONE".to_string()))
        );
    }

    #[test]
    fn remove_and_lookup() {
        let registry: CommandRegistry<u8> = CommandRegistry::new();
        registry.add(1, "ONE", 10).unwrap();

        assert!(registry.exists(1));
        assert_eq!(registry.get(1), Ok(10));

        registry.remove(1).unwrap();
        assert!(!registry.exists(1));
        assert_eq!(registry.remove(1), Err(RegistryError::UnknownId(1)));
    }

    #[test]
    fn merge_combines_two_registries() {
        let a: CommandRegistry<u8> = CommandRegistry::new();
        a.add(1, "ONE", 10).unwrap();

        let b: CommandRegistry<u8> = CommandRegistry::new();
        b.add(2, "TWO", 20).unwrap();

        a.merge(&b).unwrap();

        assert_eq!(a.size(), 2);
        assert_eq!(a.get(2), Ok(20));
    }
}
