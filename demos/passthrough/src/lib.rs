//! Bladed external controller library of the [`Passthrough`](discon::Passthrough) model
//!
//! The configuration is read from the pickle file given by the `DISCON_CONFIG`
//! environment variable, the default configuration being used otherwise.

discon::export_discon!(discon::Passthrough);
