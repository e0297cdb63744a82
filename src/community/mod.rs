//! Community detection over the similarity graph.
//!
//! Runs resolution-parameterized multi-level Louvain with edge similarity as
//! weight, then picks a hub per cluster. Detection is pure: it reads the
//! graph and returns a [`Partition`] that the engine writes back into the
//! live nodes without disturbing the layout.

mod louvain;
mod partition;

pub use partition::{Cluster, ClusterId, CommunityConfig, Partition, PartitionSource};
