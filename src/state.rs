//! # Document State Machine
//!
//! Folds ordered operation events into a document snapshot.
//!
//! Every rule is keyed by stable identifiers (method and service ids), never
//! by counters, so applying an event twice yields the same state as applying
//! it once. Events that do not fit the current state (an update for a missing
//! id, a second `Create`) are no-ops rather than errors: the log is
//! append-only and the fold must make progress over whatever it holds.

use crate::document::{
    Document, DocumentState, Service, VerificationMethod, VerificationRelationship,
};
use crate::operation::{Operation, OperationEvent, RelationshipEntry};

impl DocumentState {
    /// Apply an event, returning the resulting snapshot.
    ///
    /// Pure: `self` is left untouched. Signature checks are the caller's
    /// concern (see [`crate::operation::verify`]).
    #[must_use]
    pub fn apply(&self, event: &OperationEvent) -> Self {
        if self.metadata.deactivated {
            return self.clone();
        }
        let is_create = matches!(event.operation, Operation::Create { .. });
        if self.metadata.created.is_none() && !is_create {
            // nothing to mutate until the document is created
            return self.clone();
        }
        if self.metadata.created.is_some() && is_create {
            return self.clone();
        }

        let mut next = self.clone();
        let doc = &mut next.document;

        match &event.operation {
            Operation::Create { owner } => {
                insert_method(doc, owner);
                insert_reference(doc, VerificationRelationship::Authentication, &owner.id);
                next.metadata.created = Some(event.event_id.timestamp);
            }
            Operation::Revoke => {
                next.metadata.deactivated = true;
            }
            Operation::AddService(service) => insert_service(doc, service),
            Operation::UpdateService(service) => {
                if let Some(existing) = doc.service.iter_mut().find(|s| s.id == service.id) {
                    existing.clone_from(service);
                }
            }
            Operation::RemoveService { id } => doc.service.retain(|s| s.id != *id),
            Operation::AddVerificationMethod(method) => insert_method(doc, method),
            Operation::UpdateVerificationMethod(method) => replace_method(doc, method),
            Operation::RemoveVerificationMethod { id } => {
                doc.verification_method.retain(|vm| vm.id != *id);
                for relationship in VerificationRelationship::ALL {
                    doc.relationship_mut(relationship).retain(|r| r != id);
                }
            }
            Operation::AddVerificationRelationship(RelationshipEntry {
                relationship_type,
                method,
            }) => {
                insert_method(doc, method);
                insert_reference(doc, *relationship_type, &method.id);
            }
            Operation::UpdateVerificationRelationship(RelationshipEntry {
                relationship_type,
                method,
            }) => {
                if doc.is_authorized(&method.id, *relationship_type) {
                    replace_method(doc, method);
                }
            }
            Operation::RemoveVerificationRelationship {
                id,
                relationship_type,
            } => {
                doc.relationship_mut(*relationship_type).retain(|r| r != id);
                let referenced = VerificationRelationship::ALL
                    .iter()
                    .any(|relationship| doc.is_authorized(id, *relationship));
                if !referenced {
                    doc.verification_method.retain(|vm| vm.id != *id);
                }
            }
        }

        next.metadata.updated = Some(event.event_id.timestamp);
        next.metadata.version_id = Some(event.event_id);
        next
    }

    /// Fold a sequence of events, in order, starting from `self`.
    #[must_use]
    pub fn fold<'a>(&self, events: impl IntoIterator<Item = &'a OperationEvent>) -> Self {
        events.into_iter().fold(self.clone(), |state, event| state.apply(event))
    }
}

fn insert_method(doc: &mut Document, method: &VerificationMethod) {
    if doc.verification_method(&method.id).is_none() {
        doc.verification_method.push(method.clone());
    }
}

fn replace_method(doc: &mut Document, method: &VerificationMethod) {
    if let Some(existing) = doc.verification_method.iter_mut().find(|vm| vm.id == method.id) {
        existing.clone_from(method);
    }
}

fn insert_reference(doc: &mut Document, relationship: VerificationRelationship, id: &str) {
    let references = doc.relationship_mut(relationship);
    if !references.iter().any(|r| r == id) {
        references.push(id.to_string());
    }
}

fn insert_service(doc: &mut Document, service: &Service) {
    if doc.service(&service.id).is_none() {
        doc.service.push(service.clone());
    }
}
