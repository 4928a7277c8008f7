use bevy::{
    asset::RenderAssetUsages,
    prelude::*,
    render::mesh::PrimitiveTopology,
};

use crate::{
    cloud::PointBuffer,
    model::{ModelAsset, ModelId},
    pipeline::RenderRevision,
    streaming::{PointCloudModels, PointStreamer},
};


/// Marks the entity that displays one model of [`PointCloudModels`].
#[derive(Component, Clone, Debug)]
#[require(Transform, Visibility)]
pub struct PointCloudEntity {
    pub model: ModelId,
    rendered_revision: Option<RenderRevision>,
}

impl PointCloudEntity {
    pub fn new(model: ModelId) -> Self {
        Self {
            model,
            rendered_revision: None,
        }
    }

    pub fn rendered_revision(&self) -> Option<RenderRevision> {
        self.rendered_revision
    }
}


/// Point list mesh of `buffer`; colors gain an opaque alpha channel.
pub fn point_mesh(buffer: &PointBuffer) -> Mesh {
    let mut mesh = Mesh::new(
        PrimitiveTopology::PointList,
        RenderAssetUsages::RENDER_WORLD | RenderAssetUsages::MAIN_WORLD,
    );

    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, to_vec3(buffer.positions()));

    if let Some(normals) = buffer.normals() {
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, to_vec3(normals));
    }

    if let Some(colors) = buffer.colors() {
        let colors = colors
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2], 1.0])
            .collect::<Vec<[f32; 4]>>();
        mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, colors);
    }

    mesh
}

fn to_vec3(values: &[f32]) -> Vec<[f32; 3]> {
    match bytemuck::try_cast_slice::<f32, [f32; 3]>(values) {
        Ok(items) => items.to_vec(),
        Err(_) => values
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect(),
    }
}

fn tint_material(model: &ModelAsset) -> StandardMaterial {
    StandardMaterial {
        base_color: model.transform.color.into(),
        unlit: true,
        ..default()
    }
}

fn visibility(model: &ModelAsset) -> Visibility {
    if model.is_visible() {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    }
}


#[derive(Default)]
pub struct PointRenderPlugin;

impl Plugin for PointRenderPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            PostUpdate,
            (sync_point_entities, refresh_point_meshes)
                .chain()
                .run_if(resource_exists::<PointStreamer>),
        );
    }
}


fn sync_point_entities(
    mut commands: Commands,
    models: Res<PointCloudModels>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut clouds: Query<(
        Entity,
        &PointCloudEntity,
        &mut Transform,
        &mut Visibility,
        Option<&MeshMaterial3d<StandardMaterial>>,
    )>,
) {
    if !models.is_changed() {
        return;
    }

    for (entity, cloud, mut transform, mut visible, material) in clouds.iter_mut() {
        let Some(model) = models.0.iter().find(|model| model.id == cloud.model) else {
            commands.entity(entity).despawn();
            continue;
        };

        *transform = model.transform.to_transform();
        *visible = visibility(model);

        match material.and_then(|handle| materials.get_mut(&handle.0)) {
            Some(material) => material.base_color = model.transform.color.into(),
            None => {
                commands
                    .entity(entity)
                    .insert(MeshMaterial3d(materials.add(tint_material(model))));
            }
        }
    }

    for model in &models.0 {
        if clouds.iter().any(|(_, cloud, ..)| cloud.model == model.id) {
            continue;
        }

        commands.spawn((
            PointCloudEntity::new(model.id.clone()),
            Name::new(model.name.clone()),
            model.transform.to_transform(),
            visibility(model),
            MeshMaterial3d(materials.add(tint_material(model))),
        ));
    }
}

fn refresh_point_meshes(
    mut commands: Commands,
    streamer: Res<PointStreamer>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut clouds: Query<(Entity, &mut PointCloudEntity)>,
) {
    let pipeline = streamer.pipeline();

    for (entity, mut cloud) in clouds.iter_mut() {
        let revision = pipeline.render_revision(&cloud.model);
        if revision == cloud.rendered_revision {
            continue;
        }

        let Some(buffer) = pipeline.renderable(&cloud.model) else {
            // reloaded model with nothing loaded yet
            commands.entity(entity).remove::<Mesh3d>();
            cloud.rendered_revision = revision;
            continue;
        };

        debug!(
            model = %cloud.model,
            points = buffer.vertex_count(),
            "refreshing point mesh"
        );

        commands
            .entity(entity)
            .insert(Mesh3d(meshes.add(point_mesh(&buffer))));
        cloud.rendered_revision = revision;
    }
}
