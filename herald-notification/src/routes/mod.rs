pub mod admin;
pub mod health;
pub mod notifications;

#[cfg(test)]
pub(crate) mod testing;
