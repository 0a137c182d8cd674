mod heurist_tests;
mod provider_tests;
mod twitter_tests;
