//! Rules deciding which types and values may take part in the mapping.

use crate::error::BuildError;
use crate::transport::{Id, Request, ResponseWriter};
use crate::types::{elem_of, main_elem_of, BaseType, Kind, Ty};
use crate::value::Reflect;

/// The inbound transport object, accepted as `Ptr<Request>`
pub fn request_type() -> Ty {
    Ty::Base(BaseType::of::<Request>(Kind::Request))
}

/// The outbound sink, accepted as a bare `ResponseWriter`
pub fn response_type() -> Ty {
    Ty::Base(BaseType::of::<ResponseWriter>(Kind::Response))
}

/// The identifier, accepted as `Ptr<Id>`
pub fn id_type() -> Ty {
    Ty::Base(BaseType::of::<Id>(Kind::Id))
}

pub fn error_type() -> Ty {
    Ty::Base(BaseType::of::<dyn std::error::Error>(Kind::Error))
}

/// True if the type is provided by the request context and never needs mapping.
///
/// Fails on the forms which look like a context type but can't be honored.
pub fn is_context_type(ty: &Ty) -> Result<bool, BuildError> {
    let misuse = |expected: Ty| BuildError::ContextMisuse {
        asked: ty.clone(),
        expected,
    };
    match ty {
        Ty::Ptr(inner) if inner.is_base_of(Kind::Response) => Err(misuse(response_type())),
        Ty::Base(base) if base.kind() == Kind::Request => Err(misuse(Ty::ptr(request_type()))),
        Ty::Base(base) if base.kind() == Kind::Id => Err(misuse(Ty::ptr(id_type()))),
        Ty::Base(base) => Ok(matches!(base.kind(), Kind::Response | Kind::Error)),
        Ty::Ptr(inner) => Ok(inner.is_base_of(Kind::Request) || inner.is_base_of(Kind::Id)),
        Ty::Seq(inner) => Ok(inner.is_base_of(Kind::Error)),
    }
}

/// Dependencies are interfaces, records or sequences of records, optionally behind a pointer
pub fn is_valid_dependency_type(ty: &Ty) -> Result<(), BuildError> {
    let elem = elem_of(ty);
    let valid = match &elem {
        Ty::Base(base) => matches!(base.kind(), Kind::Interface | Kind::Record),
        Ty::Seq(inner) => inner.is_base_of(Kind::Record),
        Ty::Ptr(_) => false,
    };
    if valid {
        Ok(())
    } else {
        Err(BuildError::InvalidDependency(elem))
    }
}

/// Check a parameter of a handler or an initializer
pub fn validate_param(ty: &Ty) -> Result<(), BuildError> {
    if is_context_type(ty)? {
        return Ok(());
    }
    is_valid_dependency_type(ty)
}

/// Check the signature of an initializer.
///
/// The first input is the owner itself. The outputs are at most one value of the
/// owner type and at most one error.
pub fn validate_init(owner: &Ty, inputs: &[Ty], outputs: &[Ty]) -> Result<(), BuildError> {
    let owner_elem = main_elem_of(owner);
    match inputs.first() {
        Some(receiver) if main_elem_of(receiver) == owner_elem => (),
        _ => {
            return Err(BuildError::MissingReceiver {
                owner: owner.clone(),
            })
        }
    }

    let mut itself = false;
    let mut error = false;
    for output in outputs {
        let output = main_elem_of(output);
        if output == owner_elem && !itself {
            itself = true;
        } else if output.is_base_of(Kind::Error) && !error {
            error = true;
        } else {
            return Err(BuildError::InvalidInitializer {
                owner: owner.clone(),
                output,
            });
        }
    }
    Ok(())
}

/// Only fields starting with an upper-case letter are mapped
pub fn is_exported_field(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Records, pointers to records and sequences of records (or of pointers to records)
pub fn is_eligible_shape<V: Reflect>(value: &V) -> bool {
    value.shape().is_eligible()
}
