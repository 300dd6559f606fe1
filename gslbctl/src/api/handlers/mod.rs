pub mod agent;
pub mod datacenters;
pub mod domains;
pub mod geomaps;
pub mod health;
pub mod members;
pub mod monitors;
pub mod pools;
pub mod quotas;
pub mod sync;
