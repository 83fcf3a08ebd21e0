//! Concrete rule implementations and the class-name registry that backs
//! `config::RulesetDocument::into_rules` (design §9 "dynamic rule
//! registry", SPEC_FULL §10.3).

mod canonical;
mod classify;

use std::collections::HashMap;

use once_cell::sync::Lazy;

pub use canonical::{BrandNameRule, StrainNameRule, TagNamesRule};
pub use classify::{CreateActionRule, DestroyActionRule, UpdateActionRule};

use crate::engine::{Rule, RuleMeta};
use crate::error::ConfigError;

/// `class` string -> constructor. None of this domain's rule classes take
/// configurable params today, so every factory ignores its `params`
/// argument; the argument stays so a class that does need one can be added
/// without changing the registry's shape.
pub type RuleConstructor = fn(RuleMeta, &serde_yaml::Value) -> Result<Box<dyn Rule>, ConfigError>;

pub static FACTORY_REGISTRY: Lazy<HashMap<&'static str, RuleConstructor>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, RuleConstructor> = HashMap::new();
    m.insert("BrandNameRule", |meta, _params| Ok(Box::new(BrandNameRule::new(meta))));
    m.insert("StrainNameRule", |meta, _params| Ok(Box::new(StrainNameRule::new(meta))));
    m.insert("TagNamesRule", |meta, _params| Ok(Box::new(TagNamesRule::new(meta))));
    m.insert("CreateActionRule", |meta, _params| Ok(Box::new(CreateActionRule::new(meta))));
    m.insert("UpdateActionRule", |meta, _params| Ok(Box::new(UpdateActionRule::new(meta))));
    m.insert("DestroyActionRule", |meta, _params| Ok(Box::new(DestroyActionRule::new(meta))));
    m
});

pub fn construct(class: &str, meta: RuleMeta, params: &serde_yaml::Value) -> Result<Box<dyn Rule>, ConfigError> {
    match FACTORY_REGISTRY.get(class) {
        Some(factory) => factory(meta, params),
        None => Err(ConfigError::UnknownClass(class.to_string())),
    }
}
