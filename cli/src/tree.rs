use geoh5_io::workspace::Workspace;
use geoh5_model::entity::{EntityId, EntityKind};

pub fn print_tree(ws: &Workspace, id: EntityId, depth: usize) {
    let Some(entity) = ws.entity(id) else {
        return;
    };
    let indent = "  ".repeat(depth);
    let kind = match &entity.kind {
        EntityKind::Root { .. } => "Root",
        EntityKind::Group { .. } => "Group",
        EntityKind::Object { .. } => "Object",
        EntityKind::Data { .. } => "Data",
    };
    println!("{indent}{kind} \"{}\" {}", entity.name, entity.uid);

    for &child in entity.children() {
        print_tree(ws, child, depth + 1);
    }
}
