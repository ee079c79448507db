use std::collections::HashSet;

use crate::core::classfile::descriptor::parameter_count;
use crate::core::classfile::{
    add_invisible_annotations, environment_annotation, environment_interface_annotation,
    environment_interfaces_container, Attribute, ClassFile, Identity, InnerClassEntry, Member,
    Rebuilder, Side, SourceClass, ACC_STATIC,
};
use crate::core::error::{PipelineError, PipelineResult};

type Key = (String, String);

fn keys(class: &ClassFile, members: &[Member]) -> PipelineResult<Vec<Key>> {
    members.iter().map(|m| class.member_key(m)).collect()
}

/// Combine two versions of the same class.
///
/// The client copy provides the body of every member present on both sides.
/// Members and interfaces found on only one side are carried over and
/// tagged with the side they came from.
pub fn merge_classes(client_bytes: &[u8], server_bytes: &[u8]) -> PipelineResult<Vec<u8>> {
    let client = ClassFile::parse(client_bytes)?;
    let server = ClassFile::parse(server_bytes)?;

    let name = client.name()?;
    if server.name()? != name {
        return Err(PipelineError::transform(
            "merge",
            format!("class name mismatch: {} vs {}", name, server.name()?),
        ));
    }

    let client_field_keys = keys(&client, &client.fields)?;
    let server_field_keys = keys(&server, &server.fields)?;
    let client_method_keys = keys(&client, &client.methods)?;
    let server_method_keys = keys(&server, &server.methods)?;

    let server_fields: HashSet<&Key> = server_field_keys.iter().collect();
    let server_methods: HashSet<&Key> = server_method_keys.iter().collect();
    let client_fields: HashSet<&Key> = client_field_keys.iter().collect();
    let client_methods: HashSet<&Key> = client_method_keys.iter().collect();

    let server_only_fields: Vec<&Member> = server
        .fields
        .iter()
        .zip(&server_field_keys)
        .filter(|(_, k)| !client_fields.contains(k))
        .map(|(m, _)| m)
        .collect();
    let server_only_methods: Vec<&Member> = server
        .methods
        .iter()
        .zip(&server_method_keys)
        .filter(|(_, k)| !client_methods.contains(k))
        .map(|(m, _)| m)
        .collect();

    let mut client_src = SourceClass::new(&client, client.methods.iter())?;
    let mut server_src = SourceClass::new(&server, server_only_methods.iter().copied())?;
    let mut rb = Rebuilder::new(&Identity);
    rb.reserve_ldc(&mut [&mut client_src, &mut server_src])?;

    let this_class = rb.constant(&mut client_src, client.this_class)?;
    let super_class = rb.optional_constant(&mut client_src, client.super_class)?;

    // ── Interfaces ──────────────────────────────────────
    let client_ifaces = client.interface_names()?;
    let server_ifaces = server.interface_names()?;
    let mut interfaces = Vec::new();
    let mut one_sided = Vec::new();
    for (&idx, iface) in client.interfaces.iter().zip(&client_ifaces) {
        interfaces.push(rb.constant(&mut client_src, idx)?);
        if !server_ifaces.contains(iface) {
            one_sided.push((Side::Client, iface.clone()));
        }
    }
    for (&idx, iface) in server.interfaces.iter().zip(&server_ifaces) {
        if !client_ifaces.contains(iface) {
            interfaces.push(rb.constant(&mut server_src, idx)?);
            one_sided.push((Side::Server, iface.clone()));
        }
    }

    // ── Members ─────────────────────────────────────────
    let mut fields = Vec::new();
    for (member, key) in client.fields.iter().zip(&client_field_keys) {
        let side = (!server_fields.contains(key)).then_some(Side::Client);
        fields.push(import_tagged(&mut rb, &mut client_src, member, false, side)?);
    }
    for member in &server_only_fields {
        fields.push(import_tagged(&mut rb, &mut server_src, member, false, Some(Side::Server))?);
    }

    let mut methods = Vec::new();
    for (member, key) in client.methods.iter().zip(&client_method_keys) {
        let side = (!server_methods.contains(key)).then_some(Side::Client);
        methods.push(import_tagged(&mut rb, &mut client_src, member, true, side)?);
    }
    for member in &server_only_methods {
        methods.push(import_tagged(&mut rb, &mut server_src, member, true, Some(Side::Server))?);
    }

    // ── Class attributes ────────────────────────────────
    let plain: Vec<Attribute> = client
        .attributes
        .iter()
        .filter(|a| client.attribute_name(a).ok().as_deref() != Some("InnerClasses"))
        .cloned()
        .collect();
    let mut attributes = rb.attributes(&mut client_src, &plain)?;

    let inner = merge_inner_classes(&mut rb, &mut client_src, &mut server_src)?;
    if !inner.is_empty() {
        attributes.push(Attribute {
            name: rb.utf8("InnerClasses")?,
            info: InnerClassEntry::write_all(&inner),
        });
    }

    let iface_annotations = one_sided
        .iter()
        .map(|(side, iface)| environment_interface_annotation(rb.pool_mut(), *side, iface))
        .collect::<PipelineResult<Vec<_>>>()?;
    match iface_annotations.len() {
        0 => {}
        1 => add_invisible_annotations(rb.pool_mut(), &mut attributes, &iface_annotations)?,
        _ => {
            let container = environment_interfaces_container(rb.pool_mut(), &iface_annotations)?;
            add_invisible_annotations(rb.pool_mut(), &mut attributes, &[container])?;
        }
    }

    let merged = rb.finish(
        &client,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    )?;
    merged.to_bytes()
}

fn import_tagged(
    rb: &mut Rebuilder<'_>,
    src: &mut SourceClass<'_>,
    member: &Member,
    is_method: bool,
    side: Option<Side>,
) -> PipelineResult<Member> {
    let mut imported = rb.member(src, member, is_method)?;
    if let Some(side) = side {
        let annotation = environment_annotation(rb.pool_mut(), side)?;
        add_invisible_annotations(rb.pool_mut(), &mut imported.attributes, &[annotation])?;
    }
    Ok(imported)
}

/// Client rows first, then server rows for inner classes the client lacks.
fn merge_inner_classes(
    rb: &mut Rebuilder<'_>,
    client: &mut SourceClass<'_>,
    server: &mut SourceClass<'_>,
) -> PipelineResult<Vec<InnerClassEntry>> {
    let client_class = client.class;
    let server_class = server.class;
    let client_rows = client_class.inner_classes()?;
    let server_rows = server_class.inner_classes()?;

    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(client_rows.len());
    for row in &client_rows {
        seen.insert(client_class.pool.class_name(row.inner)?);
        merged.push(rb.inner_class(client, row)?);
    }
    for row in &server_rows {
        if seen.insert(server_class.pool.class_name(row.inner)?) {
            merged.push(rb.inner_class(server, row)?);
        }
    }
    Ok(merged)
}

/// Pad constructor parameter-annotation tables of enums (two synthetic
/// parameters) and non-static inner classes (one) at the front, so that
/// annotation indices line up with the descriptor.
///
/// Returns `None` when the class needs no change.
pub fn apply_synthetic_params_offset(bytes: &[u8]) -> PipelineResult<Option<Vec<u8>>> {
    let mut class = ClassFile::parse(bytes)?;
    let name = class.name()?;

    let offset = if class.is_enum() {
        2
    } else {
        let mut inner_offset = 0;
        for row in class.inner_classes()? {
            if class.pool.class_name(row.inner)? == name
                && row.access & ACC_STATIC == 0
                && row.outer != 0
                && row.name != 0
            {
                inner_offset = 1;
            }
        }
        inner_offset
    };
    if offset == 0 {
        return Ok(None);
    }

    let mut changed = false;
    for method in &mut class.methods {
        if class.pool.utf8_bytes(method.name)? != b"<init>" {
            continue;
        }
        let params = parameter_count(&class.pool.utf8(method.descriptor)?);
        for attr in &mut method.attributes {
            let attr_name = class.pool.utf8_bytes(attr.name)?;
            if attr_name != b"RuntimeVisibleParameterAnnotations"
                && attr_name != b"RuntimeInvisibleParameterAnnotations"
            {
                continue;
            }
            let declared = *attr.info.first().ok_or_else(|| {
                PipelineError::ClassFormat("empty parameter annotation table".into())
            })? as usize;
            if declared >= params {
                continue;
            }
            let pad = offset.min(params - declared);
            let mut info = Vec::with_capacity(attr.info.len() + pad * 2);
            info.push((declared + pad) as u8);
            info.extend(std::iter::repeat(0u8).take(pad * 2));
            info.extend_from_slice(&attr.info[1..]);
            attr.info = info;
            changed = true;
        }
    }

    if changed {
        class.to_bytes().map(Some)
    } else {
        Ok(None)
    }
}
