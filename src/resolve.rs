//! [`ModuleResolver`]: chain-of-strategies mapping `(parentId, request)` to a
//! canonical [`ModuleId`].
//!
//! The chain always runs in the order builtin, alias, namespace, relative,
//! absolute; the first strategy to produce a candidate wins. Failure to
//! resolve is always reported as a [`ResolveError`] — the resolver never
//! returns an empty/null id.

use std::collections::HashMap;

use crate::error::ResolveError;
use crate::module::ModuleId;
use crate::path::PathNormalizer;

const BUILTIN_PREFIX: &str = "@builtin/";
const BUILTIN_NAMESPACE: &str = "builtin";

/// Host-supplied resolution configuration, assembled once at startup by the
/// embedding application rather than parsed from argv inside the crate.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// Prefix → replacement, e.g. `"@env/" -> "Scripts/environment/"`.
    pub aliases: HashMap<String, String>,
    /// Extra built-in module names resolvable without the `@builtin/` prefix.
    pub builtins: Vec<String>,
    /// Root directory for `ns:relative/path` namespace requests.
    pub mods_root: String,
    /// Root directory absolute (non-relative, non-namespaced) requests are
    /// resolved against.
    pub assets_root: String,
}

/// Outcome of a single resolution strategy.
enum StrategyResult {
    Resolved(String),
    Pass,
}

/// Chain-of-strategies module resolver.
pub struct ModuleResolver {
    config: ResolverConfig,
    normalizer: PathNormalizer,
}

impl ModuleResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            normalizer: PathNormalizer::new(),
        }
    }

    /// Resolve `request` as seen from `parent`, returning a canonical
    /// [`ModuleId`] or a [`ResolveError`] naming every strategy that was
    /// tried.
    pub fn resolve(&self, parent: Option<&ModuleId>, request: &str) -> Result<ModuleId, ResolveError> {
        let mut tried = Vec::new();

        for (name, strategy) in [
            ("builtin", Self::try_builtin as StrategyFn),
            ("alias", Self::try_alias),
            ("namespace", Self::try_namespace),
            ("relative", Self::try_relative),
            ("absolute", Self::try_absolute),
        ] {
            tried.push(name);
            match strategy(self, parent, request) {
                StrategyResult::Resolved(candidate) => {
                    return self.normalizer.normalize(&candidate).map_err(|_| ResolveError {
                        request: request.to_string(),
                        parent: parent.map(|p| p.as_str().to_string()).unwrap_or_default(),
                        tried: tried.clone(),
                    });
                }
                StrategyResult::Pass => continue,
            }
        }

        Err(ResolveError {
            request: request.to_string(),
            parent: parent.map(|p| p.as_str().to_string()).unwrap_or_default(),
            tried,
        })
    }

    fn try_builtin(&self, _parent: Option<&ModuleId>, request: &str) -> StrategyResult {
        if let Some(rest) = request.strip_prefix(BUILTIN_PREFIX) {
            return StrategyResult::Resolved(format!("{BUILTIN_NAMESPACE}/{rest}"));
        }
        if self.config.builtins.iter().any(|b| b == request) {
            return StrategyResult::Resolved(format!("{BUILTIN_NAMESPACE}/{request}"));
        }
        StrategyResult::Pass
    }

    fn try_alias(&self, _parent: Option<&ModuleId>, request: &str) -> StrategyResult {
        for (prefix, replacement) in &self.config.aliases {
            if let Some(rest) = request.strip_prefix(prefix.as_str()) {
                return StrategyResult::Resolved(format!("{replacement}{rest}"));
            }
        }
        StrategyResult::Pass
    }

    fn try_namespace(&self, _parent: Option<&ModuleId>, request: &str) -> StrategyResult {
        let Some((ns, rel)) = request.split_once(':') else {
            return StrategyResult::Pass;
        };
        if ns.is_empty() || rel.is_empty() {
            return StrategyResult::Pass;
        }
        StrategyResult::Resolved(format!("{}/{ns}/{rel}", self.config.mods_root))
    }

    fn try_relative(&self, parent: Option<&ModuleId>, request: &str) -> StrategyResult {
        if !(request.starts_with("./") || request.starts_with("../")) {
            return StrategyResult::Pass;
        }
        let Some(parent) = parent else {
            return StrategyResult::Pass;
        };
        match self.normalizer.join(parent, request) {
            Ok(id) => StrategyResult::Resolved(id.as_str().to_string()),
            Err(_) => StrategyResult::Pass,
        }
    }

    fn try_absolute(&self, _parent: Option<&ModuleId>, request: &str) -> StrategyResult {
        if self.config.assets_root.is_empty() {
            StrategyResult::Resolved(request.to_string())
        } else {
            StrategyResult::Resolved(format!("{}/{}", self.config.assets_root, request))
        }
    }
}

type StrategyFn = fn(&ModuleResolver, Option<&ModuleId>, &str) -> StrategyResult;

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ModuleResolver {
        let mut aliases = HashMap::new();
        aliases.insert("@env/".to_string(), "Scripts/environment/".to_string());
        ModuleResolver::new(ResolverConfig {
            aliases,
            builtins: vec!["math".to_string()],
            mods_root: "Mods".to_string(),
            assets_root: "Assets".to_string(),
        })
    }

    #[test]
    fn builtin_prefix_wins_first() {
        let r = resolver();
        let id = r.resolve(None, "@builtin/io").unwrap();
        assert_eq!(id.as_str(), "builtin/io.js");
    }

    #[test]
    fn alias_prefix_is_substituted() {
        let r = resolver();
        let id = r.resolve(None, "@env/sky").unwrap();
        assert_eq!(id.as_str(), "Scripts/environment/sky.js");
    }

    #[test]
    fn namespace_resolves_under_mods_root() {
        let r = resolver();
        let id = r.resolve(None, "community:weapons/sword").unwrap();
        assert_eq!(id.as_str(), "Mods/community/weapons/sword.js");
    }

    #[test]
    fn empty_namespace_or_path_falls_through_to_absolute() {
        let r = resolver();
        let id = r.resolve(None, ":weapons").unwrap();
        assert_eq!(id.as_str(), "Assets/:weapons.js");
    }

    #[test]
    fn relative_resolves_against_parent_dir() {
        let r = resolver();
        let parent = r.resolve(None, "scenes/env/sky").unwrap();
        let id = r.resolve(Some(&parent), "./clouds.js").unwrap();
        assert_eq!(id.as_str(), "Assets/scenes/env/clouds.js");
    }

    #[test]
    fn absolute_falls_back_to_assets_root() {
        let r = resolver();
        let id = r.resolve(None, "weapons/sword").unwrap();
        assert_eq!(id.as_str(), "Assets/weapons/sword.js");
    }

    #[test]
    fn builtin_registered_by_name_without_prefix() {
        let r = resolver();
        let id = r.resolve(None, "math").unwrap();
        assert_eq!(id.as_str(), "builtin/math.js");
    }

    #[test]
    fn resolve_always_normalizes_the_final_candidate() {
        let r = resolver();
        // `./weapons/...` does not match the relative strategy (no parent),
        // so it falls through to absolute; the trailing normalize pass still
        // collapses the `../` segment.
        let id = r.resolve(None, "./weapons/../tools/hammer").unwrap();
        assert_eq!(id.as_str(), "Assets/tools/hammer.js");
    }
}
