//! Built-in rule tables: ordered regexes, first match wins.

use crate::config::intercept::{RewriteRuleSpec, RouteRuleSpec};

use super::capability::{CapabilityError, QueryRewrite, RouteVerdict, RoutingRules};

// -----------------------------------------------------------------------------
// ----- RuleRouter ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RuleRouter {
    rules: Vec<RouteRuleSpec>,
}

impl RuleRouter {
    pub fn new(rules: Vec<RouteRuleSpec>) -> Self {
        Self { rules }
    }
}

impl RoutingRules for RuleRouter {
    fn routing_rules(&self, identity: &str, query: &str) -> Result<RouteVerdict, CapabilityError> {
        let hit = self
            .rules
            .iter()
            .filter(|rule| applies_to(&rule.users, identity))
            .find(|rule| rule.pattern.is_match(query));

        Ok(match hit {
            Some(rule) => RouteVerdict::Route(rule.dbkey.clone()),
            None => RouteVerdict::NoChange,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- RuleRewriter ----------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RuleRewriter {
    rules: Vec<RewriteRuleSpec>,
}

impl RuleRewriter {
    pub fn new(rules: Vec<RewriteRuleSpec>) -> Self {
        Self { rules }
    }
}

impl QueryRewrite for RuleRewriter {
    fn rewrite_query(&self, identity: &str, query: &str) -> Result<String, CapabilityError> {
        let hit = self
            .rules
            .iter()
            .filter(|rule| applies_to(&rule.users, identity))
            .find(|rule| rule.pattern.is_match(query));

        Ok(match hit {
            Some(rule) => rule
                .pattern
                .replace_all(query, rule.replacement.as_str())
                .into_owned(),
            None => query.to_string(),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

// An empty user list means "everyone".
fn applies_to(users: &[String], identity: &str) -> bool {
    users.is_empty() || users.iter().any(|u| u == identity)
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
