use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Resolver identifier to watched directory, for one worker.
///
/// Containment is a plain string prefix test on the path text. Paths are not
/// canonicalized and symlinks are not resolved, so `bots/alice2/x` is inside
/// `bots/alice`.
#[derive(Debug, Default, Clone)]
pub struct WatchRegistry {
    roots: BTreeMap<String, PathBuf>,
}

/// Outcome of routing one change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Send `plugin:reload` for each resolver, in order
    Reload(Vec<String>),
    /// Change inside the base directory that no resolver owns
    Restart,
    /// Outside anything this worker cares about
    Ignore,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory a resolver is watched through: the resolver path's parent
    pub fn root_for(resolver: &str) -> PathBuf {
        match Path::new(resolver).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Root of `resolver` with a relative directory joined onto `workdir`, so
    /// it has the same form as the paths the watcher reports
    pub fn anchored_root(workdir: &Path, resolver: &str) -> PathBuf {
        let dir = Self::root_for(resolver);
        if dir.is_absolute() || workdir.as_os_str().is_empty() {
            dir
        } else if dir == Path::new(".") {
            workdir.to_path_buf()
        } else {
            workdir.join(dir)
        }
    }

    /// Map `resolver` to its directory. Returns the directory and whether the
    /// mapping changed (false when the exact pair was already known).
    pub fn register(&mut self, resolver: &str) -> (PathBuf, bool) {
        self.register_at(Path::new(""), resolver)
    }

    /// Like [`register`](Self::register), anchoring a relative root at `workdir`.
    /// The resolver key stays exactly as the child reported it.
    pub fn register_at(&mut self, workdir: &Path, resolver: &str) -> (PathBuf, bool) {
        let dir = Self::anchored_root(workdir, resolver);
        let changed = self.insert(resolver, dir.clone());
        (dir, changed)
    }

    pub fn insert(&mut self, resolver: &str, dir: PathBuf) -> bool {
        match self.roots.get(resolver) {
            Some(existing) if *existing == dir => false,
            _ => {
                debug!("🗂️ Resolver root {} -> {:?}", resolver, dir);
                self.roots.insert(resolver.to_string(), dir);
                true
            }
        }
    }

    pub fn get(&self, resolver: &str) -> Option<&Path> {
        self.roots.get(resolver).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn clear(&mut self) {
        self.roots.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.roots.iter().map(|(r, d)| (r.as_str(), d.as_path()))
    }

    /// Distinct resolvers whose root contains `path`
    pub fn matching(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        self.roots
            .iter()
            .filter(|(_, dir)| path.starts_with(dir.to_string_lossy().as_ref()))
            .map(|(resolver, _)| resolver.clone())
            .collect()
    }

    /// Decide what a change at `path` means for a worker rooted at `base_dir`
    pub fn route(&self, base_dir: &Path, path: &Path) -> Dispatch {
        let resolvers = self.matching(path);
        if !resolvers.is_empty() {
            return Dispatch::Reload(resolvers);
        }

        if is_prefix(base_dir, path) {
            Dispatch::Restart
        } else {
            Dispatch::Ignore
        }
    }
}

/// String prefix containment, see [`WatchRegistry`]
pub fn is_prefix(dir: &Path, path: &Path) -> bool {
    path.to_string_lossy()
        .starts_with(dir.to_string_lossy().as_ref())
}
