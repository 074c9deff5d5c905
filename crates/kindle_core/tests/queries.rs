//! Query caching, invalidation and reactive membership through the World.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use kindle_core::{AnyCell, Component, EntityId, QueryDescriptor, Signal, World};

struct Position {
    x: Signal<f64>,
    y: Signal<f64>,
}

impl Component for Position {
    fn fields(&self) -> Vec<(&'static str, &dyn AnyCell)> {
        vec![("x", &self.x), ("y", &self.y)]
    }

    fn clone_component(&self) -> Box<dyn Component> {
        Box::new(Position {
            x: self.x.fork(),
            y: self.y.fork(),
        })
    }
}

struct Velocity(Signal<f64>);

impl Component for Velocity {
    fn fields(&self) -> Vec<(&'static str, &dyn AnyCell)> {
        vec![("value", &self.0)]
    }

    fn clone_component(&self) -> Box<dyn Component> {
        Box::new(Velocity(self.0.fork()))
    }
}

struct Frozen;

impl Component for Frozen {
    fn fields(&self) -> Vec<(&'static str, &dyn AnyCell)> {
        Vec::new()
    }

    fn clone_component(&self) -> Box<dyn Component> {
        Box::new(Frozen)
    }
}

fn position(world: &World, x: f64, y: f64) -> Position {
    Position {
        x: world.runtime().signal(x),
        y: world.runtime().signal(y),
    }
}

fn set(ids: &[EntityId]) -> BTreeSet<EntityId> {
    ids.iter().copied().collect()
}

#[test]
fn test_same_query_instance_sees_mutations() {
    let mut world = World::new();
    let pos = world.component_type::<Position>();
    let desc = QueryDescriptor::new().all(pos);
    let id = world.query(&desc).unwrap();

    let e = world.create_entity().unwrap();
    assert_eq!(world.execute(id), Some(BTreeSet::new()));

    let p = position(&world, 0.0, 0.0);
    world.add_component(e, p).unwrap();
    assert_eq!(world.query(&desc).unwrap(), id);
    assert_eq!(world.execute(id), Some(set(&[e])));

    world.remove_component::<Position>(e).unwrap();
    assert_eq!(world.execute(id), Some(BTreeSet::new()));
    assert_eq!(world.cached_query(id).map(|q| q.recompute_count()), Some(3));
    assert_eq!(world.query_count(), 1);
}

#[test]
fn test_unrelated_mutation_keeps_cache_clean() {
    let mut world = World::new();
    let pos = world.component_type::<Position>();
    let id = world.query(&QueryDescriptor::new().all(pos)).unwrap();
    let e = world.create_entity().unwrap();
    let _ = world.execute(id);

    world.add_component(e, Frozen).unwrap();
    assert_eq!(world.cached_query(id).map(|q| q.is_dirty()), Some(false));
}

#[test]
fn test_destroy_entity_invalidates_everything() {
    let mut world = World::new();
    let a = world.create_entity().unwrap();
    let b = world.create_entity().unwrap();
    for entity in [a, b] {
        let p = position(&world, 1.0, 1.0);
        world.add_component(entity, p).unwrap();
    }
    let movers = world.query_builder().with::<Position>().build().unwrap();
    assert_eq!(world.execute(movers), Some(set(&[a, b])));

    world.destroy_entity(a).unwrap();
    assert_eq!(world.execute(movers), Some(set(&[b])));
    assert!(world.get_component::<Position>(a).is_none());
}

#[test]
fn test_builder_filters() {
    let mut world = World::new();
    let walker = world.create_entity().unwrap();
    let statue = world.create_entity().unwrap();
    let comet = world.create_entity().unwrap();

    let p = position(&world, 0.0, 0.0);
    world.add_component(walker, p).unwrap();
    let v = Velocity(world.runtime().signal(1.0));
    world.add_component(walker, v).unwrap();

    let p = position(&world, 5.0, 5.0);
    world.add_component(statue, p).unwrap();
    world.add_component(statue, Frozen).unwrap();

    let v = Velocity(world.runtime().signal(9.0));
    world.add_component(comet, v).unwrap();

    let active = world
        .query_builder()
        .any_of::<Position>()
        .any_of::<Velocity>()
        .without::<Frozen>()
        .execute()
        .unwrap();
    assert_eq!(active, set(&[walker, comet]));

    let both = world
        .query_builder()
        .with::<Position>()
        .with::<Velocity>()
        .execute()
        .unwrap();
    assert_eq!(both, set(&[walker]));

    assert_eq!(
        world.query_builder().build(),
        Err(kindle_core::WorldError::EmptyQuery)
    );
}

#[test]
fn test_reactive_query_notifies_on_membership_change_only() {
    let mut world = World::new();
    let e = world.create_entity().unwrap();
    let movers = world
        .query_builder()
        .with::<Position>()
        .without::<Frozen>()
        .reactive()
        .unwrap();

    let sizes = Rc::new(RefCell::new(Vec::new()));
    let _effect = world.runtime().effect({
        let movers = movers.clone();
        let sizes = Rc::clone(&sizes);
        move || sizes.borrow_mut().push(movers.get().len())
    });
    assert_eq!(*sizes.borrow(), vec![0]);

    let p = position(&world, 0.0, 0.0);
    world.add_component(e, p).unwrap();
    assert_eq!(*sizes.borrow(), vec![0, 1]);

    // A second instance leaves membership unchanged.
    let p = position(&world, 3.0, 3.0);
    world.add_component(e, p).unwrap();
    assert_eq!(world.component_bucket::<Position>(e).len(), 2);
    assert_eq!(*sizes.borrow(), vec![0, 1]);

    world.add_component(e, Frozen).unwrap();
    assert_eq!(*sizes.borrow(), vec![0, 1, 0]);
}

#[test]
fn test_bulk_insert_updates_reactive_membership_in_place() {
    let mut world = World::new();
    let movers = world
        .query_builder()
        .with::<Position>()
        .without::<Frozen>()
        .reactive()
        .unwrap();
    let notifications = Rc::new(Cell::new(0));
    let _effect = world.runtime().effect({
        let (movers, notifications) = (movers.clone(), Rc::clone(&notifications));
        move || {
            movers.signal().with(|_| ());
            notifications.set(notifications.get() + 1);
        }
    });

    let mut spawned = Vec::new();
    for i in 0..200 {
        let e = world.create_entity().unwrap();
        let p = position(&world, f64::from(i), 0.0);
        world.add_component(e, p).unwrap();
        spawned.push(e);
    }
    assert_eq!(movers.peek().len(), 200);
    assert_eq!(notifications.get(), 201);
    // Only the initial resolution ran the query.
    let recomputes = world.cached_query(movers.id()).map(|q| q.recompute_count());
    assert_eq!(recomputes, Some(1));

    world.add_component(spawned[0], Frozen).unwrap();
    world.destroy_entity(spawned[1]).unwrap();
    assert_eq!(movers.peek().len(), 198);
    assert!(!movers.peek().contains(&spawned[0]));

    // The cached query and the signal agree once the query is resolved.
    assert_eq!(world.execute(movers.id()), Some(movers.peek()));
}

#[test]
fn test_reactive_queries_share_one_signal() {
    let mut world = World::new();
    let pos = world.component_type::<Position>();
    let desc = QueryDescriptor::new().all(pos);
    let first = world.reactive_query(&desc).unwrap();
    let second = world.reactive_query(&desc).unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(first.signal().id(), second.signal().id());
}

#[test]
fn test_destroy_entity_notifies_once() {
    let mut world = World::new();
    let e = world.create_entity().unwrap();
    let p = position(&world, 0.0, 0.0);
    world.add_component(e, p).unwrap();
    let v = Velocity(world.runtime().signal(2.0));
    world.add_component(e, v).unwrap();

    let with_pos = world.query_builder().with::<Position>().reactive().unwrap();
    let with_vel = world.query_builder().with::<Velocity>().reactive().unwrap();

    let runs = Rc::new(Cell::new(0));
    let _effect = world.runtime().effect({
        let runs = Rc::clone(&runs);
        move || {
            let _ = with_pos.get().len() + with_vel.get().len();
            runs.set(runs.get() + 1);
        }
    });
    assert_eq!(runs.get(), 1);

    world.destroy_entity(e).unwrap();
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_component_fields_are_live_cells() {
    let mut world = World::new();
    let e = world.create_entity().unwrap();
    let p = position(&world, 1.0, 2.0);
    world.add_component(e, p).unwrap();

    let seen = Rc::new(Cell::new(0.0));
    let x = world.get_component::<Position>(e).map(|p| p.x.clone()).unwrap();
    let _effect = world.runtime().effect({
        let seen = Rc::clone(&seen);
        move || seen.set(x.get())
    });

    if let Some(p) = world.get_component::<Position>(e) {
        p.x.set(7.5);
    }
    assert!((seen.get() - 7.5).abs() < f64::EPSILON);

    let components = world.all_components(e);
    assert_eq!(components.len(), 1);
    let names: Vec<_> = components[0].fields().into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, ["x", "y"]);
    assert_eq!(components[0].fields()[0].1.debug_value(), "7.5");
}

#[test]
fn test_clone_component_is_detached() {
    let mut world = World::new();
    let e = world.create_entity().unwrap();
    let p = position(&world, 1.0, 1.0);
    world.add_component(e, p).unwrap();

    let copy = world.all_components(e)[0].clone_component();
    let other = world.create_entity().unwrap();
    world.add_boxed(other, copy).unwrap();

    if let Some(p) = world.get_component::<Position>(e) {
        p.x.set(100.0);
    }
    let copied_x = world.get_component::<Position>(other).map(|p| p.x.peek());
    assert_eq!(copied_x, Some(1.0));
}
