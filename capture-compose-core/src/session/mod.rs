pub mod acquirer;
pub mod controller;
pub(crate) mod dispatch;
pub mod engine;

#[cfg(test)]
pub(crate) mod test_support;
