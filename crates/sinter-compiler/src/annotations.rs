//! Annotation processing.
//!
//! Turns per-field `@attribute` metadata into the obligations the rest of
//! the pipeline consumes:
//!
//! - the accessor methods each class must expose (synthesized unless the
//!   user already defined a method with the same name),
//! - the per-class serialization plan, in declared field order, and
//! - the validation of flag combinations. All conflicting pairs on one field
//!   are reported as a single combined error, not a cascade.

use rustc_hash::FxHashMap;
use sinter_ast::AnnotationFlags;
use sinter_core::{AnnotationError, Diagnostics};

use crate::registry::{FieldInfo, MethodOrigin, Type};
use crate::typecheck::TypeInfo;

// ============================================================================
// Output
// ============================================================================

/// Which half of a field's accessor pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    Getter,
    Setter,
}

/// One accessor method the code generator must synthesize.
#[derive(Debug, Clone)]
pub struct AccessorSpec {
    pub class: String,
    pub field: String,
    pub name: String,
    pub kind: AccessorKind,
}

/// One entry of a class's serialization plan.
#[derive(Debug, Clone)]
pub struct SerialField {
    pub name: String,
    pub ty: Type,
    /// Derived fields contribute their method's result, not a stored slot.
    pub derived: bool,
}

/// The serializable fields of one class, in declared order.
#[derive(Debug, Clone, Default)]
pub struct SerializationPlan {
    pub class: String,
    pub fields: Vec<SerialField>,
}

/// Everything the annotation processor produces.
#[derive(Debug, Default)]
pub struct AnnotationOutput {
    pub accessors: Vec<AccessorSpec>,
    pub plans: FxHashMap<String, SerializationPlan>,
}

impl AnnotationOutput {
    pub fn plan(&self, class: &str) -> Option<&SerializationPlan> {
        self.plans.get(class)
    }
}

// ============================================================================
// Signature synthesis (shared with the type checker)
// ============================================================================

/// The accessor signatures a field's annotation implies:
/// `(name, parameter types, return type, kind)`.
///
/// An unannotated field and a bare `@attribute` both imply the full pair;
/// `read_only`/`write_only` drop one half; `derived` implies none.
pub fn implied_accessor_signatures(
    field: &FieldInfo,
) -> Vec<(String, Vec<Type>, Type, AccessorKind)> {
    let flags = field.flags();
    if flags.contains(AnnotationFlags::DERIVED) {
        return Vec::new();
    }
    let getter = (
        format!("get{}", capitalize(&field.name)),
        Vec::new(),
        field.ty.clone(),
        AccessorKind::Getter,
    );
    let setter = (
        format!("set{}", capitalize(&field.name)),
        vec![field.ty.clone()],
        Type::Void,
        AccessorKind::Setter,
    );
    if flags.contains(AnnotationFlags::READ_ONLY) {
        vec![getter]
    } else if flags.contains(AnnotationFlags::WRITE_ONLY) {
        vec![setter]
    } else {
        vec![getter, setter]
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ============================================================================
// Processing
// ============================================================================

/// Validate annotations and produce accessor/serialization obligations.
pub fn process(types: &TypeInfo, diags: &mut Diagnostics) -> AnnotationOutput {
    log::debug!("processing annotations");
    let mut output = AnnotationOutput::default();

    for class in types.registry.classes_in_order() {
        for field in class.fields.iter().filter(|f| f.declared_by == class.name) {
            validate_field(class.name.as_str(), field, types, diags);

            for (name, _, _, kind) in implied_accessor_signatures(field) {
                let synthesized = class
                    .methods
                    .iter()
                    .any(|m| m.name == name && m.origin == MethodOrigin::Accessor);
                if synthesized {
                    output.accessors.push(AccessorSpec {
                        class: class.name.clone(),
                        field: field.name.clone(),
                        name,
                        kind,
                    });
                }
            }
        }

        // The plan covers inherited fields too, in declared order.
        let plan = SerializationPlan {
            class: class.name.clone(),
            fields: class
                .fields
                .iter()
                .filter(|f| f.is_serializable())
                .map(|f| SerialField {
                    name: f.name.clone(),
                    ty: f.ty.clone(),
                    derived: f.is_derived(),
                })
                .collect(),
        };
        output.plans.insert(class.name.clone(), plan);
    }

    output
}

fn validate_field(
    class_name: &str,
    field: &FieldInfo,
    types: &TypeInfo,
    diags: &mut Diagnostics,
) {
    let flags = field.flags();
    let Some(class) = types.registry.class(class_name) else {
        return;
    };

    // All conflicting pairs land in one combined error.
    let mut conflicts = Vec::new();
    if flags.contains(AnnotationFlags::READ_ONLY | AnnotationFlags::WRITE_ONLY) {
        conflicts.push("read_only with write_only");
    }
    if flags.contains(AnnotationFlags::DERIVED | AnnotationFlags::WRITE_ONLY) {
        conflicts.push("derived with write_only");
    }
    if !conflicts.is_empty() {
        let err = AnnotationError::ConflictingFlags {
            field: field.name.clone(),
            conflicts: conflicts.join(", "),
            span: field.span,
        };
        diags.error(err.span(), err.to_string());
        return;
    }

    if flags.contains(AnnotationFlags::DERIVED) {
        let named = class
            .methods
            .iter()
            .filter(|m| m.name == field.name && m.origin == MethodOrigin::User && !m.is_static)
            .collect::<Vec<_>>();
        if named.is_empty() {
            let err = AnnotationError::DerivedMethodMissing {
                class: class_name.to_string(),
                field: field.name.clone(),
                span: field.span,
            };
            diags.error(err.span(), err.to_string());
        } else if !named
            .iter()
            .any(|m| m.params.is_empty() && m.ret == field.ty)
        {
            let err = AnnotationError::DerivedMethodMismatch {
                field: field.name.clone(),
                expected: field.ty.to_string(),
                span: named[0].span,
            };
            diags.error(err.span(), err.to_string());
        }
        if flags.contains(AnnotationFlags::READ_ONLY) {
            diags.warning(
                field.span,
                format!(
                    "annotation flag read_only on derived field '{}' is redundant",
                    field.name
                ),
            );
        }
        if field.init.is_some() {
            diags.error(
                field.span,
                format!(
                    "derived field '{}' has no stored value and cannot have an initializer",
                    field.name
                ),
            );
        }
    }

    let getter = format!("get{}", capitalize(&field.name));
    let setter = format!("set{}", capitalize(&field.name));
    if flags.contains(AnnotationFlags::READ_ONLY) && class.has_user_method(&setter) {
        let err = AnnotationError::AccessorConflict {
            field: field.name.clone(),
            flag: "read_only",
            method: setter,
            span: field.span,
        };
        diags.error(err.span(), err.to_string());
    }
    if flags.contains(AnnotationFlags::WRITE_ONLY) && class.has_user_method(&getter) {
        let err = AnnotationError::AccessorConflict {
            field: field.name.clone(),
            flag: "write_only",
            method: getter,
            span: field.span,
        };
        diags.error(err.span(), err.to_string());
    }

    if flags.contains(AnnotationFlags::SERIALIZABLE) && !field.vis.is_public() {
        let err = AnnotationError::NonPublicSerializable {
            field: field.name.clone(),
            span: field.span,
        };
        diags.error(err.span(), err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinter_core::{Span, Visibility};

    fn field(name: &str, ty: Type, flags: Option<AnnotationFlags>) -> FieldInfo {
        FieldInfo {
            name: name.into(),
            ty,
            vis: Visibility::Public,
            is_const: false,
            annotation: flags,
            init: None,
            declared_by: "Owner".into(),
            span: Span::default(),
        }
    }

    #[test]
    fn unannotated_field_implies_both_accessors() {
        let f = field("count", Type::Int, None);
        let sigs = implied_accessor_signatures(&f);
        assert_eq!(sigs.len(), 2);
        assert_eq!(sigs[0].0, "getCount");
        assert_eq!(sigs[1].0, "setCount");
        assert_eq!(sigs[1].1, vec![Type::Int]);
        assert_eq!(sigs[1].2, Type::Void);
    }

    #[test]
    fn read_only_implies_getter_only() {
        let f = field("limit", Type::Int, Some(AnnotationFlags::READ_ONLY));
        let sigs = implied_accessor_signatures(&f);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].0, "getLimit");
        assert_eq!(sigs[0].3, AccessorKind::Getter);
    }

    #[test]
    fn write_only_implies_setter_only() {
        let f = field("secret", Type::Str, Some(AnnotationFlags::WRITE_ONLY));
        let sigs = implied_accessor_signatures(&f);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].3, AccessorKind::Setter);
    }

    #[test]
    fn derived_implies_no_accessors() {
        let f = field("status", Type::Str, Some(AnnotationFlags::DERIVED));
        assert!(implied_accessor_signatures(&f).is_empty());
    }
}
