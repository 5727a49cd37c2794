//! End-to-end scenarios: stores with systems ticking over real data.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use keystone_ecs::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Health(f32);

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Value(u32);

#[derive(Debug, Clone, PartialEq)]
struct Velocity(f32);

#[derive(Debug, Default)]
struct RunLog(Vec<&'static str>);

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

struct Regen {
    health: ComponentType<EntityDomain, Health>,
}

impl System<EntityDomain> for Regen {
    fn query(&self) -> Query<EntityDomain> {
        Query::has(&self.health)
    }

    fn tick(
        &mut self,
        _dt: f32,
        ctx: &mut SystemContext<'_, EntityDomain>,
    ) -> Result<(), EcsError> {
        let health = self.health;
        ctx.for_each_chunk(|chunk, _| {
            if let Some(column) = chunk.column_mut(&health) {
                for h in column {
                    h.0 += 5.0;
                }
            }
        });
        Ok(())
    }
}

/// Strips `Value` from every entity whose value is below the threshold.
struct Cull {
    value: ComponentType<EntityDomain, Value>,
    below: u32,
}

impl System<EntityDomain> for Cull {
    fn query(&self) -> Query<EntityDomain> {
        Query::has(&self.value)
    }

    fn tick(
        &mut self,
        _dt: f32,
        ctx: &mut SystemContext<'_, EntityDomain>,
    ) -> Result<(), EcsError> {
        let (value, below) = (self.value, self.below);
        ctx.for_each_chunk(|chunk, commands| {
            let Some(column) = chunk.column(&value) else {
                return;
            };
            for (v, entity) in column.iter().zip(chunk.entities()) {
                if v.0 < below {
                    commands.remove_component(entity, &value);
                }
            }
        });
        Ok(())
    }
}

/// Appends its name to the `RunLog` resource.
macro_rules! logging_system {
    ($name:ident, $label:literal $(, $dep:expr)*) => {
        struct $name;

        impl System<EntityDomain> for $name {
            fn name(&self) -> &str {
                $label
            }

            fn query(&self) -> Query<EntityDomain> {
                Query::any()
            }

            fn dependencies(&self) -> Vec<Dependency> {
                vec![$($dep),*]
            }

            fn tick(
                &mut self,
                _dt: f32,
                ctx: &mut SystemContext<'_, EntityDomain>,
            ) -> Result<(), EcsError> {
                ctx.resource_mut::<RunLog>()?.0.push($label);
                Ok(())
            }
        }
    };
}

logging_system!(First, "first");
logging_system!(Second, "second");
logging_system!(Late, "late", Dependency::after::<Second>());
logging_system!(Ping, "ping", Dependency::after::<Pong>());
logging_system!(Pong, "pong", Dependency::after::<Ping>());

struct Faulty;

impl System<EntityDomain> for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    fn query(&self) -> Query<EntityDomain> {
        Query::any()
    }

    fn tick(
        &mut self,
        _dt: f32,
        ctx: &mut SystemContext<'_, EntityDomain>,
    ) -> Result<(), EcsError> {
        ctx.resource_mut::<RunLog>()?.0.push("faulty");
        Err(EcsError::system("boom"))
    }
}

struct Hooked {
    registered: Arc<AtomicUsize>,
    unregistered: Arc<AtomicUsize>,
}

impl System<EntityDomain> for Hooked {
    fn query(&self) -> Query<EntityDomain> {
        Query::any()
    }

    fn tick(
        &mut self,
        _dt: f32,
        _ctx: &mut SystemContext<'_, EntityDomain>,
    ) -> Result<(), EcsError> {
        Ok(())
    }

    fn on_system_registered(&mut self) {
        self.registered.fetch_add(1, Ordering::SeqCst);
    }

    fn on_system_unregistered(&mut self) {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
    }
}

/// Matches whatever its query says and does nothing.
struct Idle<const N: usize>(Query<EntityDomain>, &'static str);

impl<const N: usize> System<EntityDomain> for Idle<N> {
    fn name(&self) -> &str {
        self.1
    }

    fn query(&self) -> Query<EntityDomain> {
        self.0.clone()
    }

    fn tick(
        &mut self,
        _dt: f32,
        _ctx: &mut SystemContext<'_, EntityDomain>,
    ) -> Result<(), EcsError> {
        Ok(())
    }
}

/// Queues structural changes on one entity during the tick.
struct Reshape {
    target: Ref,
    marker: ComponentType<EntityDomain, Value>,
}

impl System<EntityDomain> for Reshape {
    fn query(&self) -> Query<EntityDomain> {
        Query::any()
    }

    fn tick(
        &mut self,
        _dt: f32,
        ctx: &mut SystemContext<'_, EntityDomain>,
    ) -> Result<(), EcsError> {
        let commands = ctx.commands();
        commands.add_component(&self.target, &self.marker, Value(1));
        commands.remove_entity(&self.target, RemoveReason::Remove);
        Ok(())
    }
}

/// What a later system saw of the entity `Reshape` touched.
#[derive(Debug, Default)]
struct Seen(Vec<(bool, bool, bool, usize)>);

struct Inspect {
    target: Ref,
    marker: ComponentType<EntityDomain, Value>,
}

impl System<EntityDomain> for Inspect {
    fn query(&self) -> Query<EntityDomain> {
        Query::any()
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::after::<Reshape>()]
    }

    fn tick(
        &mut self,
        _dt: f32,
        ctx: &mut SystemContext<'_, EntityDomain>,
    ) -> Result<(), EcsError> {
        let has_marker = ctx.get_component(&self.target, &self.marker).is_some();
        let archetype_has_marker = ctx.store().get_archetype(&self.target)?.has(&self.marker);
        let valid = self.target.is_valid();
        let count = ctx.store().entity_count();
        ctx.resource_mut::<Seen>()?
            .0
            .push((has_marker, archetype_has_marker, valid, count));
        Ok(())
    }
}

fn run_log(store: &EntityStore) -> Vec<&'static str> {
    store.resource::<RunLog>().unwrap().0.clone()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn regen_adds_health_each_tick_and_leaves_position_alone() {
    let mut store = EntityStore::new(StoreConfig::named("regen")).unwrap();
    let health = store.register_component::<Health>("health").unwrap();
    let position = store.register_component::<Position>("position").unwrap();
    store.register_system(Regen { health }).unwrap();

    let e = store.commands().add_entity(
        Holder::new()
            .with(&health, Health(100.0))
            .with(&position, Position { x: 1.0, y: 2.0, z: 3.0 }),
        AddReason::Spawn,
    );
    for _ in 0..3 {
        store.tick(0.05).unwrap();
    }

    assert_eq!(store.get_component(&e, &health), Some(&Health(115.0)));
    assert_eq!(
        store.get_component(&e, &position),
        Some(&Position { x: 1.0, y: 2.0, z: 3.0 })
    );
    assert_eq!(store.tick_count(), 3);
}

#[test]
fn system_commands_split_population_across_archetypes() {
    let mut store = EntityStore::new(StoreConfig::default()).unwrap();
    let value = store.register_component::<Value>("value").unwrap();
    store.register_system(Cull { value, below: 500 }).unwrap();

    for i in 0..1000 {
        store
            .commands()
            .add_entity(Holder::new().with(&value, Value(i)), AddReason::Spawn);
    }
    store.tick(0.0).unwrap();

    let diagnostics = store.last_diagnostics();
    assert_eq!(diagnostics.pre_flush.applied, 1000);
    assert_eq!(diagnostics.post_flush.applied, 500);
    assert_eq!(store.entity_count(), 1000);
    assert_eq!(store.archetype_for(&[value.id()]).unwrap().len(), 500);
    assert_eq!(store.archetype_for(&[]).unwrap().len(), 500);

    // Survivors all hold values at or above the threshold.
    let kept = Query::has(&value);
    for chunk in store.query_chunks(&kept) {
        assert!(chunk.column(&value).unwrap().iter().all(|v| v.0 >= 500));
    }
}

#[test]
fn changes_queued_mid_tick_are_invisible_to_later_systems() {
    let mut store = EntityStore::new(StoreConfig::default()).unwrap();
    let health = store.register_component::<Health>("health").unwrap();
    let marker = store.register_component::<Value>("marker").unwrap();
    store.register_resource(Seen::default).unwrap();
    let e = store
        .commands()
        .add_entity(Holder::new().with(&health, Health(1.0)), AddReason::Spawn);
    store.tick(0.0).unwrap();

    store
        .register_system(Reshape {
            target: e.clone(),
            marker,
        })
        .unwrap();
    store
        .register_system(Inspect {
            target: e.clone(),
            marker,
        })
        .unwrap();
    store.tick(0.0).unwrap();

    let seen = &store.resource::<Seen>().unwrap().0;
    assert_eq!(seen, &vec![(false, false, true, 1)]);
    assert!(store.last_diagnostics().failed_systems.is_empty());
    assert_eq!(store.last_diagnostics().post_flush.applied, 2);
    assert!(!e.is_valid());
    assert_eq!(store.entity_count(), 0);
}

#[test]
fn unconstrained_systems_run_in_registration_order() {
    let mut store = EntityStore::new(StoreConfig::default()).unwrap();
    store.register_resource(RunLog::default).unwrap();
    store.register_system(Second).unwrap();
    store.register_system(First).unwrap();

    store.tick(0.0).unwrap();
    assert_eq!(store.system_order(), vec!["second", "first"]);
    assert_eq!(run_log(&store), vec!["second", "first"]);
}

#[test]
fn late_dependency_reorders_only_what_it_constrains() {
    let mut store = EntityStore::new(StoreConfig::default()).unwrap();
    store.register_resource(RunLog::default).unwrap();
    store.register_system(Late).unwrap();
    store.register_system(Second).unwrap();
    store.register_system(First).unwrap();

    assert_eq!(store.system_order(), vec!["second", "late", "first"]);
    store.tick(0.0).unwrap();
    store.tick(0.0).unwrap();
    assert_eq!(
        run_log(&store),
        vec!["second", "late", "first", "second", "late", "first"]
    );
}

#[test]
fn dependency_cycle_is_rejected_and_named() {
    let mut store = EntityStore::new(StoreConfig::default()).unwrap();
    store.register_resource(RunLog::default).unwrap();
    store.register_system(First).unwrap();
    store.register_system(Ping).unwrap();

    let err = store.register_system(Pong).unwrap_err();
    match &err {
        EcsError::DependencyCycle { systems } => {
            assert!(systems.contains(&"ping".to_owned()));
            assert!(systems.contains(&"pong".to_owned()));
            assert!(!systems.contains(&"first".to_owned()));
        }
        other => panic!("expected DependencyCycle, got {other:?}"),
    }
    assert!(err.to_string().contains("ping"));

    // The failed registration left nothing behind.
    assert_eq!(store.system_state::<Pong>(), None);
    assert_eq!(store.system_order(), vec!["first", "ping"]);
    store.tick(0.0).unwrap();
    assert_eq!(run_log(&store), vec!["first", "ping"]);
}

#[test]
fn failing_system_does_not_stop_the_tick() {
    let mut store = EntityStore::new(StoreConfig::default()).unwrap();
    store.register_resource(RunLog::default).unwrap();
    store.register_system(First).unwrap();
    store.register_system(Faulty).unwrap();
    store.register_system(Second).unwrap();

    store.tick(0.0).unwrap();
    assert_eq!(run_log(&store), vec!["first", "faulty", "second"]);
    let diagnostics = store.last_diagnostics();
    assert_eq!(diagnostics.failed_systems, vec!["faulty".to_owned()]);
    assert_eq!(diagnostics.system_times.len(), 3);
    assert_eq!(store.tick_count(), 1);
}

#[test]
fn execution_plan_batches_are_disjoint() {
    let mut store = EntityStore::new(StoreConfig::default()).unwrap();
    let position = store.register_component::<Position>("position").unwrap();
    let velocity = store.register_component::<Velocity>("velocity").unwrap();
    let health = store.register_component::<Health>("health").unwrap();

    let origin = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    store
        .commands()
        .add_entity(Holder::new().with(&position, origin), AddReason::Spawn);
    store
        .commands()
        .add_entity(Holder::new().with(&velocity, Velocity(1.0)), AddReason::Spawn);
    store
        .commands()
        .add_entity(Holder::new().with(&health, Health(1.0)), AddReason::Spawn);
    store.tick(0.0).unwrap();

    store
        .register_system(Idle::<0>(Query::has(&position), "movers"))
        .unwrap();
    store
        .register_system(Idle::<1>(Query::has(&velocity), "drift"))
        .unwrap();
    store
        .register_system(Idle::<2>(Query::has(&position) | Query::has(&health), "render"))
        .unwrap();

    let plan = store.execution_plan();
    assert_eq!(plan.system_count(), 3);
    assert_eq!(plan.levels.len(), 1);
    for level in &plan.levels {
        for (i, a) in level.batches.iter().enumerate() {
            for b in &level.batches[i + 1..] {
                assert!(a.archetypes.is_disjoint(&b.archetypes));
            }
        }
    }

    // movers and render share the position archetype; drift fits beside movers.
    let batches = &plan.levels[0].batches;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].systems, vec!["movers".to_owned(), "drift".to_owned()]);
    assert_eq!(batches[1].systems, vec!["render".to_owned()]);
}

#[test]
fn lifecycle_hooks_fire_once_each() {
    let registered = Arc::new(AtomicUsize::new(0));
    let unregistered = Arc::new(AtomicUsize::new(0));
    let mut store = EntityStore::new(StoreConfig::default()).unwrap();
    store
        .register_system(Hooked {
            registered: Arc::clone(&registered),
            unregistered: Arc::clone(&unregistered),
        })
        .unwrap();

    assert_eq!(registered.load(Ordering::SeqCst), 1);
    assert_eq!(store.system_state::<Hooked>(), Some(SystemState::Registered));

    store.tick(0.0).unwrap();
    assert_eq!(store.system_state::<Hooked>(), Some(SystemState::Active));

    store.shutdown();
    store.shutdown();
    assert_eq!(unregistered.load(Ordering::SeqCst), 1);
    assert_eq!(store.system_state::<Hooked>(), None);
    assert!(store.is_shut_down());
    assert!(matches!(store.tick(0.0), Err(EcsError::StoreShutDown)));
}

#[test]
fn removal_swaps_last_row_into_the_hole() {
    let mut store = EntityStore::new(StoreConfig::default().with_chunk_capacity(8)).unwrap();
    let value = store.register_component::<Value>("value").unwrap();
    let entities: Vec<Ref> = (0..4)
        .map(|i| {
            store
                .commands()
                .add_entity(Holder::new().with(&value, Value(i)), AddReason::Spawn)
        })
        .collect();
    store.tick(0.0).unwrap();

    store
        .commands()
        .remove_entity(&entities[1], RemoveReason::Remove);
    store.tick(0.0).unwrap();

    let archetype = store.get_archetype(&entities[0]).unwrap();
    let chunk = &archetype.chunks()[0];
    assert_eq!(chunk.len(), 3);
    assert_eq!(
        chunk.entities(),
        &[entities[0].clone(), entities[3].clone(), entities[2].clone()]
    );
    assert_eq!(
        chunk.column(&value).unwrap(),
        &[Value(0), Value(3), Value(2)]
    );
    assert_eq!(store.location(&entities[3]).map(|l| l.row), Some(1));
    assert!(!entities[1].is_valid());
}

#[test]
fn chunks_fill_before_new_ones_open() {
    let mut store = EntityStore::new(StoreConfig::default().with_chunk_capacity(4)).unwrap();
    let value = store.register_component::<Value>("value").unwrap();
    for i in 0..10 {
        store
            .commands()
            .add_entity(Holder::new().with(&value, Value(i)), AddReason::Spawn);
    }
    store.tick(0.0).unwrap();

    let archetype = store.archetype_for(&[value.id()]).unwrap();
    let lens: Vec<usize> = archetype.chunks().iter().map(ArchetypeChunk::len).collect();
    assert_eq!(lens, vec![4, 4, 2]);
    assert_eq!(archetype.len(), 10);
}

#[test]
fn resources_are_checked_at_lookup_and_frozen_after_start() {
    #[derive(Debug)]
    struct Clock(u64);
    #[derive(Debug)]
    struct Weather;

    let mut store = EntityStore::new(StoreConfig::default()).unwrap();
    let clock = store.register_resource(|| Clock(7)).unwrap();
    assert!(matches!(
        store.register_resource(|| Clock(0)),
        Err(EcsError::DuplicateRegistration { .. })
    ));

    assert_eq!(store.get_resource(&clock).unwrap().0, 7);
    assert!(matches!(
        store.resource::<Weather>(),
        Err(EcsError::UnregisteredResource { .. })
    ));

    store.tick(0.0).unwrap();
    store.get_resource_mut(&clock).unwrap().0 += 1;
    assert_eq!(store.resource::<Clock>().unwrap().0, 8);
    assert!(matches!(
        store.register_resource(|| Weather),
        Err(EcsError::RegistryFrozen { .. })
    ));
}
