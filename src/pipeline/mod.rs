pub mod diagnostic; // Structured audit trail + artifact dump (CHARTLIFT_DUMP_DIR)
pub mod extraction;
