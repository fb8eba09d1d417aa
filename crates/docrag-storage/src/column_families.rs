//! Column families for the durable queue.
//!
//! - queue_messages: live messages keyed by sequence
//! - queue_dead_letter: messages that exhausted their receive budget

use rocksdb::{ColumnFamilyDescriptor, Options};

pub const CF_QUEUE_MESSAGES: &str = "queue_messages";

pub const CF_QUEUE_DEAD_LETTER: &str = "queue_dead_letter";

pub const ALL_CF_NAMES: &[&str] = &[CF_QUEUE_MESSAGES, CF_QUEUE_DEAD_LETTER];

fn dead_letter_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_QUEUE_MESSAGES, Options::default()),
        ColumnFamilyDescriptor::new(CF_QUEUE_DEAD_LETTER, dead_letter_options()),
    ]
}
