//! Typed request registry.
//!
//! Each [`RequestType`] owns one constructor. Arguments travel as a tagged
//! [`RequestArgs`] value so scenario files and hosts can describe requests as
//! data; a constructor handed another type's arguments refuses them.

use crate::request::{Request, StateRequest};
use crate::requests::{
    AutoFitOpeningRequest, ChangeMoldingAutofitRequest, DeleteFaceMoldingRequest,
    GroupFlipTransactionRequest, LightSlotStateRequest,
};
use fp_core::{EntityId, Field, FieldValue, LogGroupType, TxnError, TxnResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    ChangeMoldingAutofit,
    LightSlotState,
    DeleteFaceMolding,
    GroupFlip,
    AutoFitOpening,
    SetField,
}

impl RequestType {
    pub const ALL: [RequestType; 6] = [
        RequestType::ChangeMoldingAutofit,
        RequestType::LightSlotState,
        RequestType::DeleteFaceMolding,
        RequestType::GroupFlip,
        RequestType::AutoFitOpening,
        RequestType::SetField,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::ChangeMoldingAutofit => "change_molding_autofit",
            RequestType::LightSlotState => "light_slot_state",
            RequestType::DeleteFaceMolding => "delete_face_molding",
            RequestType::GroupFlip => "group_flip",
            RequestType::AutoFitOpening => "auto_fit_opening",
            RequestType::SetField => "set_field",
        }
    }
}

/// Constructor arguments, one variant per [`RequestType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestArgs {
    ChangeMoldingAutofit {
        molding: Option<EntityId>,
        auto_fit: bool,
    },
    LightSlotState {
        model: Option<EntityId>,
        checked: bool,
    },
    DeleteFaceMolding {
        face: Option<EntityId>,
        molding: Option<EntityId>,
    },
    GroupFlip {
        group: Option<EntityId>,
    },
    AutoFitOpening {
        opening: Option<EntityId>,
        host: Option<EntityId>,
    },
    SetField {
        entity: EntityId,
        field: Field,
        value: FieldValue,
        description: String,
        category: LogGroupType,
    },
}

impl RequestArgs {
    pub fn request_type(&self) -> RequestType {
        match self {
            RequestArgs::ChangeMoldingAutofit { .. } => RequestType::ChangeMoldingAutofit,
            RequestArgs::LightSlotState { .. } => RequestType::LightSlotState,
            RequestArgs::DeleteFaceMolding { .. } => RequestType::DeleteFaceMolding,
            RequestArgs::GroupFlip { .. } => RequestType::GroupFlip,
            RequestArgs::AutoFitOpening { .. } => RequestType::AutoFitOpening,
            RequestArgs::SetField { .. } => RequestType::SetField,
        }
    }
}

pub type RequestConstructor = fn(RequestArgs) -> TxnResult<Box<dyn Request>>;

fn mismatch(expected: RequestType, got: &RequestArgs) -> TxnError {
    TxnError::ArgumentMismatch {
        expected: expected.as_str(),
        got: got.request_type().as_str(),
    }
}

fn build_change_molding_autofit(args: RequestArgs) -> TxnResult<Box<dyn Request>> {
    match args {
        RequestArgs::ChangeMoldingAutofit { molding, auto_fit } => {
            Ok(Box::new(ChangeMoldingAutofitRequest::new(molding, auto_fit)))
        }
        other => Err(mismatch(RequestType::ChangeMoldingAutofit, &other)),
    }
}

fn build_light_slot_state(args: RequestArgs) -> TxnResult<Box<dyn Request>> {
    match args {
        RequestArgs::LightSlotState { model, checked } => {
            Ok(Box::new(LightSlotStateRequest::new(model, checked)))
        }
        other => Err(mismatch(RequestType::LightSlotState, &other)),
    }
}

fn build_delete_face_molding(args: RequestArgs) -> TxnResult<Box<dyn Request>> {
    match args {
        RequestArgs::DeleteFaceMolding { face, molding } => {
            Ok(Box::new(DeleteFaceMoldingRequest::new(face, molding)))
        }
        other => Err(mismatch(RequestType::DeleteFaceMolding, &other)),
    }
}

fn build_group_flip(args: RequestArgs) -> TxnResult<Box<dyn Request>> {
    match args {
        RequestArgs::GroupFlip { group } => Ok(Box::new(GroupFlipTransactionRequest::new(group))),
        other => Err(mismatch(RequestType::GroupFlip, &other)),
    }
}

fn build_auto_fit_opening(args: RequestArgs) -> TxnResult<Box<dyn Request>> {
    match args {
        RequestArgs::AutoFitOpening { opening, host } => {
            Ok(Box::new(AutoFitOpeningRequest::new(opening, host)))
        }
        other => Err(mismatch(RequestType::AutoFitOpening, &other)),
    }
}

fn build_set_field(args: RequestArgs) -> TxnResult<Box<dyn Request>> {
    match args {
        RequestArgs::SetField {
            entity,
            field,
            value,
            description,
            category,
        } => Ok(Box::new(
            StateRequest::field_mode(description, category).transact(entity, field, value),
        )),
        other => Err(mismatch(RequestType::SetField, &other)),
    }
}

fn default_constructor(ty: RequestType) -> RequestConstructor {
    match ty {
        RequestType::ChangeMoldingAutofit => build_change_molding_autofit,
        RequestType::LightSlotState => build_light_slot_state,
        RequestType::DeleteFaceMolding => build_delete_face_molding,
        RequestType::GroupFlip => build_group_flip,
        RequestType::AutoFitOpening => build_auto_fit_opening,
        RequestType::SetField => build_set_field,
    }
}

/// Maps every request type to its constructor.
#[derive(Debug, Clone)]
pub struct RequestRegistry {
    constructors: HashMap<RequestType, RequestConstructor>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        let constructors = RequestType::ALL
            .iter()
            .map(|&ty| (ty, default_constructor(ty)))
            .collect();
        Self { constructors }
    }

    /// Replace the constructor for `ty`. Returns the previous one.
    pub fn register(
        &mut self,
        ty: RequestType,
        constructor: RequestConstructor,
    ) -> Option<RequestConstructor> {
        log::debug!("registry: overriding constructor for {}", ty.as_str());
        self.constructors.insert(ty, constructor)
    }

    pub fn create(&self, args: RequestArgs) -> TxnResult<Box<dyn Request>> {
        let ty = args.request_type();
        let constructor = self
            .constructors
            .get(&ty)
            .copied()
            .unwrap_or_else(|| default_constructor(ty));
        constructor(args)
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_type_builds_from_its_arguments() {
        let registry = RequestRegistry::new();
        let id = Some(EntityId::intern("registry_target"));
        let args = [
            RequestArgs::ChangeMoldingAutofit {
                molding: id,
                auto_fit: true,
            },
            RequestArgs::LightSlotState {
                model: id,
                checked: true,
            },
            RequestArgs::DeleteFaceMolding {
                face: id,
                molding: id,
            },
            RequestArgs::GroupFlip { group: id },
            RequestArgs::AutoFitOpening {
                opening: id,
                host: None,
            },
            RequestArgs::SetField {
                entity: EntityId::intern("registry_target"),
                field: Field::Visible,
                value: FieldValue::Bool(false),
                description: "Hide".into(),
                category: LogGroupType::ViewOperation,
            },
        ];
        let built: Vec<RequestType> = args.iter().map(RequestArgs::request_type).collect();
        assert_eq!(built, RequestType::ALL.to_vec());
        for a in args {
            let req = registry.create(a).unwrap();
            assert!(!req.description().is_empty());
        }
    }

    #[test]
    fn set_field_is_mergeable() {
        let registry = RequestRegistry::new();
        let req = registry
            .create(RequestArgs::SetField {
                entity: EntityId::intern("registry_move"),
                field: Field::X,
                value: FieldValue::Number(2.0),
                description: "Move content".into(),
                category: LogGroupType::ContentOperation,
            })
            .unwrap();
        assert!(req.can_transact_field());
        assert_eq!(req.category(), LogGroupType::ContentOperation);
    }

    #[test]
    fn constructor_rejects_foreign_arguments() {
        let err = build_group_flip(RequestArgs::LightSlotState {
            model: None,
            checked: true,
        })
        .unwrap_err();
        assert_eq!(
            err,
            TxnError::ArgumentMismatch {
                expected: "group_flip",
                got: "light_slot_state",
            }
        );
    }

    #[test]
    fn registered_constructor_overrides_default() {
        fn always_fails(args: RequestArgs) -> TxnResult<Box<dyn Request>> {
            Err(mismatch(RequestType::SetField, &args))
        }

        let mut registry = RequestRegistry::new();
        assert!(registry.register(RequestType::GroupFlip, always_fails).is_some());
        let result = registry.create(RequestArgs::GroupFlip { group: None });
        assert!(matches!(result, Err(TxnError::ArgumentMismatch { .. })));
    }

    #[test]
    fn arguments_parse_from_json() {
        let args: RequestArgs =
            serde_json::from_str(r#"{"type":"group_flip","group":"g1"}"#).unwrap();
        assert_eq!(
            args,
            RequestArgs::GroupFlip {
                group: Some(EntityId::intern("g1"))
            }
        );
    }
}
