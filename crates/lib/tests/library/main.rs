mod common;
mod dispatch_tests;
mod index_tests;
mod render_tests;
