use serde::Serialize;
use std::collections::HashSet;

/// Logical client identifier as used by the federated-learning coordinator.
pub type ClientId = usize;

/// Anything that carries a logical client identifier (e.g. a coordinator-side client handle).
pub trait HasClientId {
    fn client_id(&self) -> ClientId;
}

/// The clients selected for one round, in either of the two accepted shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveClients {
    /// One entry per configured client; non-zero means selected.
    Bitmap(Vec<u8>),
    /// Explicit identifiers, order preserved.
    Ids(Vec<ClientId>),
}

impl ActiveClients {
    /// Classify an untyped list the way coordinators historically passed it: a list exactly
    /// `total` long holding only 0/1 is a bitmap, anything else is an identifier list.
    pub fn infer(values: &[u64], total: usize) -> Self {
        if values.len() == total && values.iter().all(|v| *v <= 1) {
            Self::Bitmap(values.iter().map(|v| *v as u8).collect())
        } else {
            Self::Ids(values.iter().map(|v| *v as ClientId).collect())
        }
    }

    pub fn from_clients<C: HasClientId>(clients: &[C]) -> Self {
        Self::Ids(clients.iter().map(HasClientId::client_id).collect())
    }

    /// Normalize into the ordered set the simulator indexes from 0.
    ///
    /// Bitmaps yield ascending identifiers; lists keep the caller's order, and a repeated
    /// identifier keeps only its first position.
    pub fn normalize(&self) -> ActiveSet {
        match self {
            Self::Bitmap(bits) => bits
                .iter()
                .enumerate()
                .filter(|(_, flag)| **flag != 0)
                .map(|(id, _)| id)
                .collect(),
            Self::Ids(ids) => {
                let mut seen = HashSet::with_capacity(ids.len());
                ids.iter().copied().filter(|id| seen.insert(*id)).collect()
            }
        }
    }
}

impl From<Vec<ClientId>> for ActiveClients {
    fn from(ids: Vec<ClientId>) -> Self {
        Self::Ids(ids)
    }
}

/// Ordered logical identifiers for one round. Position `i` is the simulator's local index `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActiveSet(Vec<ClientId>);

impl ActiveSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[ClientId] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ClientId> for ActiveSet {
    fn from_iter<I: IntoIterator<Item = ClientId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
