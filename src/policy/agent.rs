//! A [`PolicyHead`] driving one environment through the [`Policy`] trait.

use ndarray::Array1;
use rand::RngCore;

use super::head::PolicyHead;
use super::memory::Memory;
use super::trait_::Policy;
use super::PolicyError;
use crate::env::Observation;
use crate::types::FromActionRow;

/// Single-environment wrapper around a [`PolicyHead`].
///
/// Keeps the memory state between calls and clears it at episode starts.
#[derive(Debug)]
pub struct NeuralAgent<M: Memory> {
    head: PolicyHead<M>,
    state: M::State,
    mask: f32,
    deterministic: bool,
}

impl<M: Memory> NeuralAgent<M> {
    pub fn new(head: PolicyHead<M>) -> Self {
        let state = head.initial_state(1);
        Self {
            head,
            state,
            mask: 0.0,
            deterministic: false,
        }
    }

    /// Take distribution modes instead of sampling.
    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn head(&self) -> &PolicyHead<M> {
        &self.head
    }

    pub fn state(&self) -> &M::State {
        &self.state
    }
}

impl<M, A> Policy<A> for NeuralAgent<M>
where
    M: Memory,
    A: FromActionRow,
{
    fn select_action(
        &mut self,
        observation: &Observation,
        rng: &mut dyn RngCore,
    ) -> Result<A, PolicyError> {
        let inputs = Observation::stack(std::slice::from_ref(observation))?;
        let masks = Array1::from_elem(1, self.mask);
        let out = self
            .head
            .act(&inputs, &self.state, &masks, self.deterministic, rng)?;
        self.state = out.state;
        self.mask = 1.0;
        let row = out.action.row(0).to_vec();
        Ok(A::from_action_row(&row)?)
    }

    fn begin_episode(&mut self) {
        self.mask = 0.0;
    }

    fn name(&self) -> &str {
        if self.head.state_size() > 0 {
            "neural-gru"
        } else {
            "neural"
        }
    }
}
