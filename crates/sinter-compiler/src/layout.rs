//! Class record layouts.
//!
//! Each class lowers to a fixed-layout record: one pointer-sized slot per
//! implemented interface (the interface tables, at the head of the record),
//! then every field in declaration order, inherited fields first, with
//! natural alignment. The interface table binds each interface method, in
//! interface declaration order, to the class's matching method symbol; it is
//! the sole virtual dispatch path.

use crate::registry::{ClassInfo, Registry, Type};

/// One bound method slot of an interface table.
#[derive(Debug, Clone, PartialEq)]
pub struct ItableEntry {
    /// Interface method name.
    pub method: String,
    /// Symbol of the class method bound into the slot.
    pub symbol: String,
}

/// The interface table of one implemented interface.
#[derive(Debug, Clone, PartialEq)]
pub struct ItableLayout {
    pub interface: String,
    /// Byte offset of the table slot in the record.
    pub offset: u32,
    /// Entries in interface declaration order.
    pub entries: Vec<ItableEntry>,
}

/// One field slot of the record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSlot {
    pub name: String,
    pub ty: Type,
    pub offset: u32,
    pub size: u32,
}

/// The complete record layout of a class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLayout {
    pub name: String,
    pub size: u32,
    pub itables: Vec<ItableLayout>,
    pub fields: Vec<FieldSlot>,
}

impl ClassLayout {
    pub fn field(&self, name: &str) -> Option<&FieldSlot> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn itable(&self, interface: &str) -> Option<&ItableLayout> {
        self.itables.iter().find(|t| t.interface == interface)
    }
}

/// Storage size of a value of this type, in bytes.
pub fn size_of(ty: &Type) -> u32 {
    match ty {
        Type::Boolean => 1,
        Type::Int | Type::Float => 4,
        Type::Double => 8,
        // Strings, d-strings and object references are pointer-sized.
        Type::Str | Type::DStr | Type::Null => 8,
        Type::Class(_) | Type::Interface(_) | Type::Pointer(_) => 8,
        Type::Void => 0,
    }
}

fn align_to(offset: u32, align: u32) -> u32 {
    if align == 0 {
        return offset;
    }
    offset.div_ceil(align) * align
}

/// Compute the record layout for a class.
pub fn layout_class(info: &ClassInfo, registry: &Registry) -> ClassLayout {
    // Interfaces from the root ancestor down, declaration order, deduplicated.
    let mut chain = Vec::new();
    let mut current = Some(info.name.as_str());
    while let Some(name) = current {
        chain.push(name);
        current = registry.class(name).and_then(|c| c.extends.as_deref());
    }
    let mut interfaces: Vec<&str> = Vec::new();
    for name in chain.iter().rev() {
        if let Some(class) = registry.class(name) {
            for iface in &class.implements {
                if !interfaces.contains(&iface.as_str()) {
                    interfaces.push(iface);
                }
            }
        }
    }

    let mut offset = 0u32;
    let mut itables = Vec::new();
    for iface_name in interfaces {
        let entries = registry
            .interface(iface_name)
            .map(|iface| {
                iface
                    .methods
                    .iter()
                    .map(|required| {
                        let symbol = info
                            .methods
                            .iter()
                            .filter(|m| !m.is_static)
                            .find(|m| m.signature_matches(required))
                            .map(|m| registry.method_symbol(m))
                            .unwrap_or_default();
                        ItableEntry {
                            method: required.name.clone(),
                            symbol,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        itables.push(ItableLayout {
            interface: iface_name.to_string(),
            offset,
            entries,
        });
        offset += 8;
    }

    // Derived fields have no stored value; reads route through their method,
    // so they get no slot.
    let mut fields = Vec::new();
    for field in info.fields.iter().filter(|f| !f.is_derived()) {
        let size = size_of(&field.ty);
        offset = align_to(offset, size.min(8));
        fields.push(FieldSlot {
            name: field.name.clone(),
            ty: field.ty.clone(),
            offset,
            size,
        });
        offset += size;
    }

    ClassLayout {
        name: info.name.clone(),
        size: align_to(offset.max(1), 8),
        itables,
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{FieldInfo, InterfaceInfo};
    use sinter_core::{Span, Visibility};

    fn field(name: &str, ty: Type) -> FieldInfo {
        FieldInfo {
            name: name.into(),
            ty,
            vis: Visibility::Private,
            is_const: false,
            annotation: None,
            init: None,
            declared_by: "Counter".into(),
            span: Span::default(),
        }
    }

    #[test]
    fn fields_follow_declaration_order_with_alignment() {
        let registry = Registry::new();
        let info = ClassInfo {
            name: "Counter".into(),
            type_params: Vec::new(),
            extends: None,
            implements: Vec::new(),
            fields: vec![
                field("flag", Type::Boolean),
                field("count", Type::Int),
                field("rate", Type::Double),
            ],
            methods: Vec::new(),
            span: Span::default(),
        };
        let layout = layout_class(&info, &registry);
        assert_eq!(layout.fields[0].offset, 0); // bool at 0
        assert_eq!(layout.fields[1].offset, 4); // int aligned to 4
        assert_eq!(layout.fields[2].offset, 8); // double aligned to 8
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn itable_slots_precede_fields() {
        let mut registry = Registry::new();
        registry.add_interface(InterfaceInfo {
            name: "Printable".into(),
            methods: Vec::new(),
            span: Span::default(),
        });
        let info = ClassInfo {
            name: "Counter".into(),
            type_params: Vec::new(),
            extends: None,
            implements: vec!["Printable".into()],
            fields: vec![field("count", Type::Int)],
            methods: Vec::new(),
            span: Span::default(),
        };
        let layout = layout_class(&info, &registry);
        assert_eq!(layout.itables.len(), 1);
        assert_eq!(layout.itables[0].offset, 0);
        assert_eq!(layout.fields[0].offset, 8);
    }
}
