use crate::error::OniError;

pub const DEFAULT_PROVIDER: &str = "https://data.ldaca.edu.au";

/// Known provider base URLs in insertion order, one of them selected.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<String>,
    selected: usize,
}

impl ProviderRegistry {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: vec![default_provider.into()],
            selected: 0,
        }
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn selected(&self) -> &str {
        &self.providers[self.selected]
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.providers.iter().any(|known| known == provider)
    }

    /// Appends and selects `provider`. Empty or already known values are
    /// ignored; the comparison is exact, without trimming.
    pub fn add(&mut self, provider: &str) -> bool {
        if provider.is_empty() || self.contains(provider) {
            return false;
        }
        self.providers.push(provider.to_string());
        self.selected = self.providers.len() - 1;
        true
    }

    pub fn select(&mut self, provider: &str) -> Result<(), OniError> {
        let index = self
            .providers
            .iter()
            .position(|known| known == provider)
            .ok_or_else(|| OniError::UnknownProvider(provider.to_string()))?;
        self.selected = index;
        Ok(())
    }

    pub fn select_next(&mut self) {
        self.selected = (self.selected + 1) % self.providers.len();
    }

    pub fn select_previous(&mut self) {
        self.selected = self
            .selected
            .checked_sub(1)
            .unwrap_or(self.providers.len() - 1);
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDER)
    }
}
