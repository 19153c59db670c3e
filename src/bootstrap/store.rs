use crate::bootstrap::BootstrapError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;

#[async_trait]
pub trait BootstrapScriptStore: Debug + Send + Sync {
    async fn get(&self, tag: &str) -> Result<Option<String>, BootstrapError>;
}

#[derive(Debug, Default)]
pub struct MemoryBootstrapStore {
    scripts: HashMap<String, String>,
}

impl MemoryBootstrapStore {
    pub fn len(&self) -> usize {
        self.scripts.len()
    }
}

impl<T: Into<String>, C: Into<String>> FromIterator<(T, C)> for MemoryBootstrapStore {
    fn from_iter<I: IntoIterator<Item = (T, C)>>(iter: I) -> Self {
        MemoryBootstrapStore {
            scripts: iter.into_iter().map(|(tag, content)| (tag.into(), content.into())).collect(),
        }
    }
}

#[async_trait]
impl BootstrapScriptStore for MemoryBootstrapStore {
    async fn get(&self, tag: &str) -> Result<Option<String>, BootstrapError> {
        Ok(self.scripts.get(tag).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn get_returns_the_script_of_a_tag() {
        let store = MemoryBootstrapStore::from_iter([("leak-detection", "#!/bin/bash\n")]);

        assert_eq!(store.get("leak-detection").await.unwrap().as_deref(), Some("#!/bin/bash\n"));
        assert_eq!(store.get("other").await.unwrap(), None);
    }
}
