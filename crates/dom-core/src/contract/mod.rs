//! Domiciliation contracts: entity, expiry classification and repository.

mod entity;
mod repository;

pub use entity::{
    end_date_from, expiry_status, Contract, ContractDetails, ContractPatch, ContractStatus,
    DeleteOutcome, ExpiryStatus, NewContract, Urgency,
};
pub use repository::ContractRepository;
