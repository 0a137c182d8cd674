pub mod agent;
pub mod classifier;
pub mod composer;
pub mod dedupe;
pub mod poller;
pub mod poster;
pub mod queue;
pub mod runtime;

#[cfg(test)]
pub(crate) mod tests;
