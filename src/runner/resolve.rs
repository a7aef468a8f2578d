//! Rule resolution
//!
//! Directive names are resolved to validated rules through a
//! [`RuleRepository`]. Each identifier is loaded and validated at most once
//! per resolver.

use crate::config::{validate_rule, Rule, RuleRepository};
use crate::error::{RuleError, RuleResult};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Resolves and caches rules for one run
pub struct RuleResolver {
    repository: Box<dyn RuleRepository>,
    cache: RefCell<HashMap<String, Rc<Rule>>>,
}

impl RuleResolver {
    pub fn new(repository: impl RuleRepository + 'static) -> Self {
        RuleResolver {
            repository: Box::new(repository),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Resolve a directive name to its rule
    pub fn resolve(&self, name: &str) -> RuleResult<Rc<Rule>> {
        if let Some(rule) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(rule));
        }

        let raw = self
            .repository
            .find(name)?
            .ok_or_else(|| RuleError::RuleNotFound(name.to_string()))?;
        let rule = Rc::new(validate_rule(name, raw)?);
        log::debug!(
            "resolved rule '{}' ({}) with {} command(s)",
            rule.identifier,
            rule.name,
            rule.commands.len()
        );

        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&rule));
        Ok(rule)
    }

    /// Load and validate every rule the repository knows about
    ///
    /// Returns one entry per identifier so a single broken rule does not hide
    /// the others.
    pub fn validate_all(&self) -> RuleResult<Vec<(String, RuleResult<Rc<Rule>>)>> {
        let identifiers = self.repository.identifiers()?;
        Ok(identifiers
            .into_iter()
            .map(|id| {
                let result = self.resolve(&id);
                (id, result)
            })
            .collect())
    }

    /// Number of rules loaded so far
    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl fmt::Debug for RuleResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleResolver")
            .field("cached", &self.cached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_rule, RawRule};

    fn repository() -> HashMap<String, RawRule> {
        let mut rules = HashMap::new();
        rules.insert(
            "echo".to_string(),
            parse_rule("identifier: echo\nname: Echo\ncommand: echo {{ file }}\n", "echo")
                .unwrap(),
        );
        rules.insert(
            "broken".to_string(),
            parse_rule(
                "identifier: broken\nname: Broken\ncommand: x\narguments:\n  - identifier: file\n    default: y\n",
                "broken",
            )
            .unwrap(),
        );
        rules
    }

    #[test]
    fn test_resolve_and_cache() {
        let resolver = RuleResolver::new(repository());
        let first = resolver.resolve("echo").unwrap();
        let second = resolver.resolve("echo").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn test_rule_not_found() {
        let resolver = RuleResolver::new(repository());
        assert!(matches!(
            resolver.resolve("xelatex"),
            Err(RuleError::RuleNotFound(name)) if name == "xelatex"
        ));
    }

    #[test]
    fn test_reserved_argument_is_malformed() {
        let resolver = RuleResolver::new(repository());
        assert!(matches!(
            resolver.resolve("broken"),
            Err(RuleError::MalformedRule { identifier, .. }) if identifier == "broken"
        ));
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_validate_all() {
        let resolver = RuleResolver::new(repository());
        let report = resolver.validate_all().unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].0, "broken");
        assert!(report[0].1.is_err());
        assert!(report[1].1.is_ok());
    }
}
