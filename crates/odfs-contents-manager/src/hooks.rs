use std::sync::Arc;

use odfs_contents_core::{ContentModel, SaveModel};

/// A callback run around saves with the saved path and a model.
///
/// Hooks run synchronously at fixed points of the save pipeline. Closures of
/// the right shape implement this trait directly.
pub trait SaveHook<M>: Send + Sync {
    fn run(&self, path: &str, model: &M) -> anyhow::Result<()>;
}

impl<M, F> SaveHook<M> for F
where
    F: Fn(&str, &M) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, path: &str, model: &M) -> anyhow::Result<()> {
        self(path, model)
    }
}

/// Runs before any write, with the model as submitted.
pub type PreSaveHook = Arc<dyn SaveHook<SaveModel>>;

/// Runs after the write, with the re-read model.
pub type PostSaveHook = Arc<dyn SaveHook<ContentModel>>;
