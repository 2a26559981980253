use super::{set_score, Mid, Module, ModuleType};
use crate::error::SpiderError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

type Bucket = HashMap<Mid, Arc<dyn Module>>;

/// Stores modules by type and hands out the least loaded one on request.
#[derive(Default)]
pub struct Registry {
    modules: RwLock<HashMap<ModuleType, Bucket>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `module` under the type encoded in its MID.
    ///
    /// Returns `Ok(false)` if a module with the same MID is already present.
    pub fn register(&self, module: Arc<dyn Module>) -> Result<bool, SpiderError> {
        let mid = module.id().clone();
        let module_type = mid.module_type();
        if !module_type.is_implemented_by(module.as_ref()) {
            return Err(SpiderError::IncorrectModuleType { mid, module_type });
        }

        let mut modules = self.modules.write();
        let bucket = modules.entry(module_type).or_default();
        if bucket.contains_key(&mid) {
            debug!("[Registry] --> module {} is already registered", mid);
            return Ok(false);
        }
        info!("[Registry] --> registered {} {}", module_type, mid);
        bucket.insert(mid, module);
        Ok(true)
    }

    /// Removes the module with `mid`, reporting whether it was present.
    pub fn unregister(&self, mid: &Mid) -> bool {
        let mut modules = self.modules.write();
        modules
            .get_mut(&mid.module_type())
            .and_then(|bucket| bucket.remove(mid))
            .is_some()
    }

    /// Returns the module of `module_type` with the lowest score.
    ///
    /// Scores are refreshed on a snapshot taken under the read lock, so
    /// selection never blocks registration. Ties go to whichever candidate
    /// the map yields first.
    pub fn get(&self, module_type: ModuleType) -> Result<Arc<dyn Module>, SpiderError> {
        let candidates = self.get_all_by_type(module_type)?;
        candidates
            .into_values()
            .map(|module| {
                set_score(module.as_ref());
                (module.score(), module)
            })
            .min_by_key(|(score, _)| *score)
            .map(|(_, module)| module)
            .ok_or(SpiderError::ModuleNotFound(module_type))
    }

    /// Snapshot of every module of `module_type`.
    pub fn get_all_by_type(&self, module_type: ModuleType) -> Result<Bucket, SpiderError> {
        let modules = self.modules.read();
        match modules.get(&module_type) {
            Some(bucket) if !bucket.is_empty() => Ok(bucket.clone()),
            _ => Err(SpiderError::ModuleNotFound(module_type)),
        }
    }

    /// Snapshot of every registered module.
    pub fn get_all(&self) -> Bucket {
        let modules = self.modules.read();
        modules
            .values()
            .flat_map(|bucket| bucket.iter())
            .map(|(mid, module)| (mid.clone(), Arc::clone(module)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.modules.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.modules.write().clear();
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let modules = self.modules.read();
        let mut mids: Vec<&Mid> = modules.values().flat_map(|bucket| bucket.keys()).collect();
        mids.sort();
        f.debug_struct("Registry").field("modules", &mids).finish()
    }
}
