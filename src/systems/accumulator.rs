use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;

use crate::error::{OdeError, Result};

use super::{
    action::{Action, ActionContext, ActionInput},
    area::CrossDirection,
    trigger::Occurrence,
};

pub const OCCURRENCES: &str = "occurrences";
pub const OCCURRENCES_IN: &str = "occurrences_in";
pub const OCCURRENCES_OUT: &str = "occurrences_out";

/// Running totals for one trigger, published to its actions once per frame
#[derive(Debug)]
pub struct Accumulator {
    id: String,
    counters: IndexMap<String, u64>,
    actions: Vec<Arc<Action>>,
}

impl Accumulator {
    pub fn new(id: &str) -> Self {
        let mut counters = IndexMap::new();
        counters.insert(String::from(OCCURRENCES), 0);
        Accumulator {
            id: String::from(id),
            counters,
            actions: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_action(&mut self, action: Arc<Action>) -> Result<()> {
        if self.actions.iter().any(|a| a.id() == action.id()) {
            return Err(OdeError::InUse {
                kind: "action",
                id: String::from(action.id()),
                owner: self.id.clone(),
            });
        }
        self.actions.push(action);
        Ok(())
    }

    pub fn actions(&self) -> &[Arc<Action>] {
        &self.actions
    }

    pub fn counters(&self) -> &IndexMap<String, u64> {
        &self.counters
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn update(&mut self, occurrence: &Occurrence) {
        *self.counters.entry(String::from(OCCURRENCES)).or_insert(0) += 1;
        let directional = match occurrence.direction {
            Some(CrossDirection::In) => Some(OCCURRENCES_IN),
            Some(CrossDirection::Out) => Some(OCCURRENCES_OUT),
            None => None,
        };
        if let Some(name) = directional {
            *self.counters.entry(String::from(name)).or_insert(0) += 1;
        }
    }

    pub fn publish(&self, ctx: &mut ActionContext) {
        let input = ActionInput::Metrics {
            accumulator_id: &self.id,
            counters: &self.counters,
        };
        for action in self.actions.iter() {
            action.apply(&input, ctx);
        }
    }

    pub fn reset(&mut self) {
        debug!("Reset accumulator \"{}\": {:?}", self.id, self.counters);
        for value in self.counters.values_mut() {
            *value = 0;
        }
    }
}
