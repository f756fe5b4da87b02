mod harness;

mod agentic_integration;
mod planner_tests;
mod server_tests;
mod table_store_tests;
