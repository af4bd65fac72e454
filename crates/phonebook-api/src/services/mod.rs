//! Services for the phonebook API.

pub mod csv_codec;
