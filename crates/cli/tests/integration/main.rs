mod common;
mod commands_tests;
mod handlers_tests;
