//! Typed access to the run configuration.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    /// Section names, lowercased, in no particular order.
    fn sections(&self) -> Vec<String>;
}
