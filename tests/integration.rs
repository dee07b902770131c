//! Cross-module scenarios: the component registry, scene tree, matrix and
//! bounding-box pipeline, and event bus working together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use glam::{Vec3, vec2};

use foxglove_scene::{
    Component, ComponentFactories, Event, RenderLayer, Scene, SceneLink,
};

#[derive(Default)]
struct Collider {
    hits: AtomicU32,
}

impl Component for Collider {
    fn name(&self) -> &'static str {
        "Collider"
    }
}

#[derive(Default)]
struct Tint;

impl Component for Tint {
    fn name(&self) -> &'static str {
        "Tint"
    }
}

fn factories() -> Arc<ComponentFactories> {
    ComponentFactories::builder()
        .register(Collider::default)
        .register_multi(Tint::default)
        .build()
}

fn scene() -> Scene {
    Scene::new(factories(), vec2(1280.0, 720.0))
}

#[test]
fn exclusive_component_under_heavy_concurrency() {
    let scene = scene();
    let door = scene.spawn("door");
    let entity = door.entity().clone();

    let barrier = std::sync::Barrier::new(16);
    let instances: Vec<Arc<Collider>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    entity.add_component::<Collider>().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Exactly one stored instance, and every caller observed it.
    assert_eq!(entity.get_components::<Collider>().len(), 1);
    let stored = entity.get_component::<Collider>().unwrap();
    for instance in &instances {
        assert!(Arc::ptr_eq(instance, &stored));
    }

    // Multi-instance types are unaffected by the exclusivity rule.
    entity.add_component::<Tint>().unwrap();
    entity.add_component::<Tint>().unwrap();
    assert_eq!(entity.get_components::<Tint>().len(), 2);
}

#[test]
fn tree_consistency_through_the_scene() {
    let scene = scene();
    let panel = scene.spawn("panel");
    let c1 = scene.spawn("c1");
    let c2 = scene.spawn("c2");

    scene.add_children(&panel, &[&c1, &c2]).unwrap();

    let children = scene.tree().children(panel.node());
    assert_eq!(children, vec![c1.node(), c2.node()]);
    assert_eq!(scene.tree().parent(c1.node()), Some(panel.node()));
    assert_eq!(scene.tree().parent(c2.node()), Some(panel.node()));

    scene.remove_child(&panel, &c1).unwrap();
    assert_eq!(scene.tree().parent(c1.node()), None);
    assert!(!scene.tree().has_child(panel.node(), c1.node()));
    assert!(scene.tree().has_child(panel.node(), c2.node()));
}

#[test]
fn door_and_handle_scenario() {
    let scene = scene();
    let door = scene.spawn("door");
    let handle = scene.spawn("handle");

    door.set_layer(Some(RenderLayer::new(0)));
    door.transform().set_position(vec2(100.0, 50.0));
    door.transform().set_scale(vec2(2.0, 2.0));
    door.transform().set_size(vec2(40.0, 80.0));
    handle.transform().set_position(vec2(10.0, 0.0));
    handle.transform().set_size(vec2(4.0, 4.0));
    scene.add_child(&door, &handle).unwrap();

    // Handle's world X = door's world X + local offset * combined scale.
    let world = handle.matrix().matrix().transform_point3(Vec3::ZERO);
    assert_eq!(world.x, 100.0 + 10.0 * 2.0);
    assert_eq!(world.y, 50.0);

    // Build and cache the handle's boxes, then invalidate the *door*.
    let before = handle.boxes().boxes();
    assert_eq!(handle.boxes().rebuild_count(), 1);
    door.transform().set_position(vec2(200.0, 50.0));

    // No explicit call on the handle: the next read rebuilds.
    let after = handle.boxes().boxes();
    assert_eq!(handle.boxes().rebuild_count(), 2);
    assert_eq!(after.hit_test.bottom_left.x, before.hit_test.bottom_left.x + 100.0);
}

#[test]
fn event_ordering_between_sync_and_async_subscribers() {
    let event = Event::<u32>::new();
    let sync_calls = Arc::new(AtomicU32::new(0));
    let async_done = Arc::new(AtomicBool::new(false));

    let sync_clone = sync_calls.clone();
    event
        .subscribe(move |_| {
            sync_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let done_clone = async_done.clone();
    event
        .subscribe_async(move |_| {
            let done = done_clone.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                done.store(true, Ordering::SeqCst);
                Ok(())
            })
        })
        .unwrap();

    // Invoke from a background thread; it must block on the async work.
    let event_clone = event.clone();
    std::thread::spawn(move || event_clone.invoke(1).unwrap())
        .join()
        .unwrap();

    assert!(async_done.load(Ordering::SeqCst));
    assert_eq!(sync_calls.load(Ordering::SeqCst), 1);
    assert_eq!(event.invocation_count(), 1);
}

#[test]
fn dependent_caches_invalidate_without_polling() {
    let scene = scene();
    let door = scene.spawn("door");
    door.transform().set_size(vec2(10.0, 10.0));
    door.entity().add_component::<Collider>().unwrap();

    // A collider keeps its own derived cache and refreshes it only when the
    // boxes-changed event fires.
    let collider = door.entity().get_component::<Collider>().unwrap();
    let collider_clone = collider.clone();
    door.boxes()
        .on_changed()
        .subscribe(move |_| {
            collider_clone.hits.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    door.boxes().boxes();
    door.transform().set_position(vec2(1.0, 0.0));
    door.transform().set_position(vec2(2.0, 0.0));
    door.boxes().boxes();
    door.transform().set_position(vec2(3.0, 0.0));

    // One notification per clean→dirty transition, not per mutation.
    assert_eq!(collider.hits.load(Ordering::SeqCst), 2);
}

#[test]
fn update_thread_writes_while_render_thread_reads() {
    let scene = Arc::new(scene());
    let object = scene.spawn("walker");
    object.transform().set_size(vec2(10.0, 10.0));

    let render = {
        let object = object.clone();
        std::thread::spawn(move || {
            for _ in 0..500 {
                let boxes = object.boxes().boxes();
                // A box is never torn: width/height always match the sprite.
                assert_eq!(boxes.hit_test.width(), 10.0);
                assert_eq!(boxes.hit_test.height(), 10.0);
            }
        })
    };

    for step in 0..200 {
        object.transform().set_position(vec2(step as f32, 0.0));
    }
    render.join().unwrap();

    assert_eq!(
        object.boxes().boxes().hit_test.bottom_left,
        vec2(199.0, 0.0)
    );
}

#[test]
fn viewport_matrices_are_shared_per_layer() {
    let scene = scene();
    for i in 0..10 {
        let object = scene.spawn(&format!("prop-{i}"));
        object.transform().set_size(vec2(5.0, 5.0));
        object.set_layer(Some(RenderLayer::new(3)));
        object.boxes().boxes();
    }

    // Ten objects on one layer share a single computed viewport matrix.
    assert_eq!(scene.viewports().computed_count(), 1);

    scene.viewport().set_zoom(vec2(2.0, 2.0));
    for i in 0..10 {
        scene.get(&format!("prop-{i}")).unwrap().boxes().boxes();
    }
    assert_eq!(scene.viewports().computed_count(), 2);
}

#[test]
fn save_load_shaped_round_trip() {
    let scene = scene();
    let room = scene.spawn("room");
    let desk = scene.spawn("desk");
    let lamp = scene.spawn("lamp");
    scene.add_child(&room, &desk).unwrap();
    scene.add_child(&desk, &lamp).unwrap();
    desk.entity().add_component::<Collider>().unwrap();

    // Serialization enumerates live components and flat tree edges.
    assert_eq!(desk.entity().components().len(), 1);
    let links = scene.links();
    assert_eq!(
        links,
        vec![
            SceneLink {
                id: "desk".to_string(),
                parent: Some("room".to_string()),
            },
            SceneLink {
                id: "lamp".to_string(),
                parent: Some("desk".to_string()),
            },
            SceneLink {
                id: "room".to_string(),
                parent: None,
            },
        ]
    );

    // A fresh scene reconstructs the hierarchy with no dangling edges.
    let loaded = scene_from_links(&links);
    let desk2 = loaded.get("desk").unwrap();
    let room2 = loaded.get("room").unwrap();
    assert_eq!(loaded.tree().parent(desk2.node()), Some(room2.node()));
    assert_eq!(loaded.links(), links);
}

fn scene_from_links(links: &[SceneLink]) -> Scene {
    let scene = scene();
    for link in links {
        scene.spawn(&link.id);
    }
    scene.restore_links(links).unwrap();
    scene
}
