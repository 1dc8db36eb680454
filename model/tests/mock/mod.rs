/*!

This test module provides mock implementations of the collaborator traits so that the bring-up can
be tested without AWS or Kubernetes. Every mock records the calls it receives in a shared [`Calls`]
log, and the mock cluster keeps its state in a shared [`ClusterState`] so that a test can inspect
what was written.

!*/

pub(crate) mod cloud;
pub(crate) mod cluster;

use std::sync::{Arc, Mutex};

/// The names of the calls made to any mock, in order.
#[derive(Clone, Debug, Default)]
pub(crate) struct Calls(Arc<Mutex<Vec<String>>>);

impl Calls {
    pub(crate) fn record<S: Into<String>>(&self, call: S) {
        self.0.lock().unwrap().push(call.into());
    }

    pub(crate) fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == call).count()
    }
}

pub(crate) use cloud::{MockCloud, MockProvisioner, MockResources, MockTokens};
pub(crate) use cluster::{ClusterState, MockConnector};
