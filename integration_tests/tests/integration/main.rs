mod authenticator;
mod claim;
mod genesis;
mod greeting;
mod test_utils;
