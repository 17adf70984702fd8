//! Presentation Context negotiation, Part 8 Annex A and Part 7 D.3.3.4.
//!
//! Both entry points are pure functions: given the proposal and the local
//! configuration (acceptor side) or the peer's result (requestor side),
//! they compute the authoritative context table deterministically, with
//! no I/O and no mutable state.

use std::collections::HashMap;

use crate::{
    pdu::{PresentationContextProposed, PresentationContextResult, PresentationContextResultReason, RoleSelection},
    primitives::{PresentationContext, PresentationContextRole},
    uid::Uid,
};

/// A locally supported abstract syntax and the transfer syntaxes the
/// acceptor is willing to negotiate for it, in the order it prefers to
/// advertise them (advertised order has no bearing on selection: the
/// requestor's proposal order always governs, per Part 8 Table 9-18).
#[derive(Debug, Clone)]
pub struct SupportedAbstractSyntax {
    pub abstract_syntax: Uid,
    pub transfer_syntaxes: Vec<Uid>,
    /// Whether the acceptor is willing to take on the SCU and/or SCP role
    /// for this abstract syntax, consulted only when the requestor
    /// proposes role selection for it.
    pub role: PresentationContextRole,
}

/// Resolve the requestor's proposal against the acceptor's local support
/// table, producing the table both peers use for subsequent P-DATA.
///
/// Returns contexts sorted ascending by id, matching the input order's
/// ids (a permutation of the request ids).
pub fn negotiate_as_acceptor(
    requested: &[PresentationContextProposed],
    supported: &[SupportedAbstractSyntax],
    role_requests: &[RoleSelection],
) -> Vec<PresentationContext> {
    let by_abstract_syntax: HashMap<&str, &SupportedAbstractSyntax> = supported
        .iter()
        .map(|s| (s.abstract_syntax.as_str(), s))
        .collect();
    let role_by_abstract_syntax: HashMap<&str, &RoleSelection> = role_requests
        .iter()
        .map(|r| (r.sop_class_uid.as_str(), r))
        .collect();

    let mut out: Vec<PresentationContext> = requested
        .iter()
        .map(|pc| {
            let local = by_abstract_syntax.get(pc.abstract_syntax.as_str());

            let (result, selected) = match local {
                None => (
                    PresentationContextResultReason::AbstractSyntaxNotSupported,
                    pc.transfer_syntaxes.first().cloned(),
                ),
                Some(local) => {
                    // Honor the requestor's proposal order, not the
                    // acceptor's own preference order.
                    let accepted = pc
                        .transfer_syntaxes
                        .iter()
                        .find(|ts| local.transfer_syntaxes.iter().any(|l| l == *ts))
                        .cloned();
                    match accepted {
                        Some(ts) => (PresentationContextResultReason::Acceptance, Some(ts)),
                        None => (
                            PresentationContextResultReason::TransferSyntaxesNotSupported,
                            pc.transfer_syntaxes.first().cloned(),
                        ),
                    }
                }
            };

            let role = resolve_role_as_acceptor(
                pc.abstract_syntax.as_str(),
                &role_by_abstract_syntax,
                local.map(|l| l.role),
            );

            PresentationContext {
                id: pc.id,
                abstract_syntax: pc.abstract_syntax.clone(),
                transfer_syntaxes: selected.into_iter().collect(),
                role,
                result: Some(result),
            }
        })
        .collect();

    out.sort_by_key(|pc| pc.id);
    out
}

/// Default role assignment absent any role-selection item: requestor
/// SCU, acceptor SCP (Part 7 D.3.3.4).
fn resolve_role_as_acceptor(
    abstract_syntax: &str,
    requested: &HashMap<&str, &RoleSelection>,
    local_opinion: Option<PresentationContextRole>,
) -> PresentationContextRole {
    match requested.get(abstract_syntax) {
        None => PresentationContextRole { scu: true, scp: false },
        Some(req) => {
            // Grant a role only if the acceptor has configured support
            // for it; otherwise fall back to the default for that role.
            let local = local_opinion.unwrap_or(PresentationContextRole { scu: false, scp: true });
            PresentationContextRole {
                scu: req.scu_role && local.scu,
                scp: req.scp_role && local.scp,
            }
        }
    }
}

/// Build the role-selection reply items the acceptor should place in its
/// A-ASSOCIATE-AC's User Information, one per abstract syntax the
/// requestor asked about and the acceptor has an explicit opinion on.
///
/// An abstract syntax absent from `supported`'s role declarations gets no
/// reply item: the standard's default (requestor SCU, acceptor SCP)
/// applies silently.
pub fn role_selection_replies(
    role_requests: &[RoleSelection],
    supported: &[SupportedAbstractSyntax],
) -> Vec<RoleSelection> {
    let local_by_abstract_syntax: HashMap<&str, &SupportedAbstractSyntax> = supported
        .iter()
        .map(|s| (s.abstract_syntax.as_str(), s))
        .collect();

    role_requests
        .iter()
        .filter_map(|req| {
            let local = local_by_abstract_syntax.get(req.sop_class_uid.as_str())?;
            Some(RoleSelection {
                sop_class_uid: req.sop_class_uid.clone(),
                scu_role: req.scu_role && local.role.scu,
                scp_role: req.scp_role && local.role.scp,
            })
        })
        .collect()
}

/// Resolve the acceptor's result against what the requestor originally
/// proposed, producing the requestor-side view of the negotiated table.
///
/// Any requested context absent from `result` (the acceptor is not
/// required to echo every id, though in practice it always does) is
/// marked user-rejected with its first proposed transfer syntax echoed.
pub fn negotiate_as_requestor(
    requested: &[PresentationContextProposed],
    result: &[PresentationContextResult],
) -> Vec<PresentationContext> {
    let result_by_id: HashMap<u8, &PresentationContextResult> =
        result.iter().map(|r| (r.id, r)).collect();

    let mut out: Vec<PresentationContext> = requested
        .iter()
        .map(|pc| match result_by_id.get(&pc.id) {
            Some(r) => PresentationContext {
                id: pc.id,
                abstract_syntax: pc.abstract_syntax.clone(),
                transfer_syntaxes: vec![r.transfer_syntax.clone()],
                role: PresentationContextRole { scu: true, scp: false },
                result: Some(to_primitive_reason(r.reason)),
            },
            None => PresentationContext {
                id: pc.id,
                abstract_syntax: pc.abstract_syntax.clone(),
                transfer_syntaxes: pc.transfer_syntaxes.first().cloned().into_iter().collect(),
                role: PresentationContextRole { scu: true, scp: false },
                result: Some(crate::primitives::PresentationContextResultReason::UserRejection),
            },
        })
        .collect();

    out.sort_by_key(|pc| pc.id);
    out
}

fn to_primitive_reason(
    reason: PresentationContextResultReason,
) -> crate::primitives::PresentationContextResultReason {
    use crate::primitives::PresentationContextResultReason as P;
    match reason {
        PresentationContextResultReason::Acceptance => P::Acceptance,
        PresentationContextResultReason::UserRejection => P::UserRejection,
        PresentationContextResultReason::NoReason => P::NoReason,
        PresentationContextResultReason::AbstractSyntaxNotSupported => P::AbstractSyntaxNotSupported,
        PresentationContextResultReason::TransferSyntaxesNotSupported => P::TransferSyntaxesNotSupported,
    }
}

/// `true` if every requested context was rejected (either for an
/// unsupported abstract syntax or an empty transfer-syntax intersection).
/// The acceptor must short-circuit to a whole-proposal A-ASSOCIATE-RJ in
/// this case rather than send an -AC in which all contexts failed.
pub fn all_contexts_rejected(negotiated: &[PresentationContext]) -> bool {
    !negotiated.is_empty() && negotiated.iter().all(|pc| !pc.is_accepted())
}
