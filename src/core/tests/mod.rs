
mod runtime_tests;
