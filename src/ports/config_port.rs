//! Configuration access port trait.

/// Raw string lookup by INI section and key. Typed parsing and range checks
/// live in `domain::config_validation`.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    fn has_section(&self, section: &str) -> bool;
}
