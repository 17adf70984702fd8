//! DICOM association module
//!
//! This module contains utilities for establishing associations
//! between DICOM nodes via TCP/IP, from both the requestor (SCU) and
//! acceptor (SCP) perspectives.

pub mod client;
pub mod pdata;
pub mod server;

pub use client::{ClientAssociation, ClientAssociationOptions};
pub use pdata::PDataWriter;
pub use server::{AccessControl, AcceptAny, AcceptCalledAeTitle, ServerAssociation, ServerAssociationOptions};
