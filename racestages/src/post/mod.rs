pub mod stage_result;
