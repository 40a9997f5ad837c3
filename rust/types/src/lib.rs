mod operation;
mod trace_record;
mod work_item;

pub use operation::*;
pub use trace_record::*;
pub use work_item::*;

// Re-export the generated stubs for the raft key-value service.
pub mod raft_proto {
    tonic::include_proto!("raftapi");
}
