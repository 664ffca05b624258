//! End-to-end tests for kb-harvest

mod crawl_tests;
