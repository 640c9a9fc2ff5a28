pub mod domain;
pub mod services;
pub mod transport;

#[cfg(test)]
mod test_helpers;
