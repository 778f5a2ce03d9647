pub mod cloudant;
