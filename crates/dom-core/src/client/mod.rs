//! Client entities and repository.
//!
//! Clients come in two kinds, individuals and corporations, stored in
//! separate tables and addressed everywhere else as an (id, kind) pair.

mod entity;
mod repository;

pub use entity::{
    Client, ClientKind, CorporateClient, CorporatePatch, IndividualClient, IndividualPatch,
    NewCorporateClient, NewIndividualClient,
};
pub use repository::ClientRepository;
