use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::storage::ComponentHooks;
use crate::system::SystemDef;

#[derive(Debug, PartialEq)]
struct Pos(i32);

#[derive(Debug, PartialEq)]
struct Vel(i32);

struct Frozen;

struct Counter(i32);

impl Component for Pos {}
impl Component for Vel {}
impl Component for Frozen {}
impl Component for Counter {}

fn base_world() -> World {
    WorldBuilder::new()
        .register::<Pos>()
        .register::<Vel>()
        .register::<Frozen>()
        .build()
}

type Log = Rc<RefCell<Vec<&'static str>>>;

#[test]
fn create_assigns_distinct_ids() {
    let mut world = base_world();
    let a = world.create(|_| {});
    let b = world.create(|_| {});
    let c = world.create(|_| {});
    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_eq!(world.entity_count(), 3);
    assert!(world.is_alive(a) && world.is_alive(b) && world.is_alive(c));
}

#[test]
fn removed_id_is_recycled() {
    let mut world = base_world();
    let a = world.create(|_| {});
    let _b = world.create(|_| {});
    world.remove(a).unwrap();
    assert!(!world.is_alive(a));

    let c = world.create(|_| {});
    assert_eq!(c.id(), a.id());
    assert!(world.is_alive(c));
    assert_eq!(world.entity_count(), 2);
}

#[test]
fn delete_twice() {
    let mut world = base_world();
    let e = world.create(|_| {});
    world.remove(e).unwrap();
    assert!(world.remove(e).is_err());
}

#[test]
fn destroyed_entity_loses_components() {
    let mut world = base_world();
    let e = world.create(|entity| {
        entity.add(Pos(1)).add(Vel(2));
    });
    world.remove(e).unwrap();
    assert!(!world.has::<Pos>(e));
    assert!(!world.has::<Vel>(e));

    // The recycled id starts from a clean composition.
    let e2 = world.create(|_| {});
    assert_eq!(e2.id(), e.id());
    assert!(!world.has::<Pos>(e2));
}

#[test]
fn hooks_fire_in_replace_order() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let added = log.clone();
    let removed = log.clone();
    let mut world = WorldBuilder::new()
        .register_with_hooks::<Pos>(
            ComponentHooks::new()
                .on_add(move |world, e| {
                    assert!(world.has::<Pos>(e));
                    added.borrow_mut().push("add");
                })
                .on_remove(move |world, e| {
                    // The value is still reachable while the hook runs.
                    assert!(world.has::<Pos>(e));
                    removed.borrow_mut().push("remove");
                }),
        )
        .build();

    let e = world.create(|entity| {
        entity.add(Pos(1));
    });
    world.insert(e, Pos(2));
    assert_eq!(*log.borrow(), vec!["add", "remove", "add"]);
    assert_eq!(world.get::<Pos>(e).0, 2);

    log.borrow_mut().clear();
    world.remove(e).unwrap();
    assert_eq!(*log.borrow(), vec!["remove"]);
}

#[test]
fn dispose_fires_no_hooks() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let removed = log.clone();
    let mut world = WorldBuilder::new()
        .register_with_hooks::<Pos>(
            ComponentHooks::new().on_remove(move |_, _| removed.borrow_mut().push("remove")),
        )
        .build();

    world.create(|entity| {
        entity.add(Pos(0));
    });
    world.dispose();
    assert!(log.borrow().is_empty());
}

#[should_panic(expected = "after dispose")]
#[test]
fn use_after_dispose_panics() {
    let mut world = base_world();
    world.dispose();
    world.create(|_| {});
}

#[test]
fn family_membership_follows_mutations() {
    let mut world = base_world();
    let family = world.family(&FamilySpec::new().all_of::<Pos>().none_of::<Frozen>());

    let e1 = world.create(|entity| {
        entity.add(Pos(0));
    });
    assert!(world.family_contains(family, e1));
    assert_eq!(world.family_len(family), 1);

    world.insert(e1, Frozen);
    assert!(!world.family_contains(family, e1));
    assert_eq!(world.family_len(family), 0);

    world.remove_component::<Frozen>(e1);
    assert!(world.family_contains(family, e1));
}

#[test]
fn empty_entity_matches_pure_none_of_family() {
    let mut world = base_world();
    let family = world.family(&FamilySpec::new().none_of::<Frozen>());

    let e = world.create(|_| {});
    assert!(world.family_contains(family, e));

    world.insert(e, Frozen);
    assert!(!world.family_contains(family, e));
}

#[test]
fn any_of_requires_one_match() {
    let mut world = base_world();
    let family = world.family(&FamilySpec::new().any_of::<Pos>().any_of::<Vel>());

    let bare = world.create(|_| {});
    let with_pos = world.create(|entity| {
        entity.add(Pos(0));
    });
    let with_both = world.create(|entity| {
        entity.add(Pos(0)).add(Vel(0));
    });

    assert!(!world.family_contains(family, bare));
    assert!(world.family_contains(family, with_pos));
    assert!(world.family_contains(family, with_both));
}

#[test]
fn family_created_late_scans_live_entities() {
    let mut world = base_world();
    let a = world.create(|entity| {
        entity.add(Pos(0));
    });
    let _b = world.create(|_| {});

    let family = world.family(&FamilySpec::new().all_of::<Pos>());
    assert_eq!(world.family_len(family), 1);
    assert!(world.family_contains(family, a));
}

#[test]
fn families_dedup_by_spec_equality() {
    let mut world = base_world();
    let a = world.family(&FamilySpec::new().all_of::<Pos>().none_of::<Frozen>());
    let b = world.family(&FamilySpec::new().none_of::<Frozen>().all_of::<Pos>());
    assert_eq!(a, b);

    let c = world.family(&FamilySpec::new().all_of::<Pos>());
    assert_ne!(a, c);
}

#[test]
fn family_members_are_listed_in_descending_id_order() {
    let mut world = base_world();
    let family = world.family(&FamilySpec::new().all_of::<Pos>());
    let ids: Vec<Entity> = (0..3)
        .map(|i| {
            world.create(|entity| {
                entity.add(Pos(i));
            })
        })
        .collect();

    let members = world.family_members(family);
    assert_eq!(members, vec![ids[2], ids[1], ids[0]]);
}

#[test]
fn deferred_destroy_keeps_entity_visible_during_iteration() {
    let mut world = base_world();
    let family = world.family(&FamilySpec::new().all_of::<Pos>());
    let doomed = world.create(|entity| {
        entity.add(Pos(0));
    });
    let other = world.create(|entity| {
        entity.add(Pos(1));
    });

    let mut visited = Vec::new();
    world.for_each(family, |world, entity| {
        visited.push(entity);
        if entity == doomed {
            world.remove(entity).unwrap();
            // Queued, not applied: the entity is still alive here.
            assert!(world.is_alive(entity));
            // Removing again while queued is accepted.
            world.remove(entity).unwrap();
        }
    });

    assert_eq!(visited.len(), 2);
    assert!(visited.contains(&doomed) && visited.contains(&other));
    assert!(!world.is_alive(doomed));
    assert!(!world.family_contains(family, doomed));
    assert_eq!(world.family_len(family), 1);
}

#[test]
fn deferred_component_ops_apply_after_iteration() {
    let mut world = base_world();
    let family = world.family(&FamilySpec::new().all_of::<Pos>().none_of::<Frozen>());
    let e = world.create(|entity| {
        entity.add(Pos(0));
    });

    world.for_each(family, |world, entity| {
        world.insert(entity, Frozen);
        // Deferred: nothing observable yet.
        assert!(!world.has::<Frozen>(entity));
        assert!(world.family_contains(family, entity));
    });

    assert!(world.has::<Frozen>(e));
    assert!(!world.family_contains(family, e));
}

#[test]
fn entities_created_during_iteration_join_at_next_iteration() {
    let mut world = base_world();
    let family = world.family(&FamilySpec::new().all_of::<Pos>());
    world.create(|entity| {
        entity.add(Pos(0));
    });

    let mut first_pass = 0;
    world.for_each(family, |world, _| {
        first_pass += 1;
        if first_pass == 1 {
            world.create(|entity| {
                entity.add(Pos(9));
            });
        }
    });
    assert_eq!(first_pass, 1);
    assert_eq!(world.family_len(family), 2);

    let mut second_pass = 0;
    world.for_each(family, |_, _| second_pass += 1);
    assert_eq!(second_pass, 2);
}

struct Recorder {
    log: Rc<RefCell<Vec<(&'static str, Entity)>>>,
}

impl FamilyListener for Recorder {
    fn on_entity_added(&self, _world: &mut World, entity: Entity) {
        self.log.borrow_mut().push(("added", entity));
    }

    fn on_entity_removed(&self, _world: &mut World, entity: Entity) {
        self.log.borrow_mut().push(("removed", entity));
    }
}

#[test]
fn family_listener_observes_membership_flips() {
    let mut world = base_world();
    let family = world.family(&FamilySpec::new().all_of::<Pos>().none_of::<Frozen>());
    let log = Rc::new(RefCell::new(Vec::new()));
    world.add_family_listener(family, Recorder { log: log.clone() });

    let e = world.create(|entity| {
        entity.add(Pos(0));
    });
    world.insert(e, Frozen);
    world.remove_component::<Frozen>(e);
    world.remove(e).unwrap();

    assert_eq!(
        *log.borrow(),
        vec![("added", e), ("removed", e), ("added", e), ("removed", e)]
    );
}

#[test]
fn entity_events_are_published_in_order() {
    let mut world = base_world();
    let mut reader = world.register_entity_reader();

    let a = world.create(|_| {});
    let b = world.create(|_| {});
    world.remove(a).unwrap();

    let events: Vec<EntityEvent> = world.entity_events(&mut reader).copied().collect();
    assert_eq!(
        events,
        vec![
            EntityEvent::Created(a),
            EntityEvent::Created(b),
            EntityEvent::Removed(a),
        ]
    );
}

#[test]
fn presence_equals_last_structural_op() {
    let mut world = base_world();
    let e = world.create(|_| {});

    let script = [true, false, false, true, true, false, true];
    let mut present = false;
    for &add in &script {
        if add {
            world.insert(e, Pos(0));
        } else {
            world.remove_component::<Pos>(e);
        }
        present = add;
        assert_eq!(world.has::<Pos>(e), present);
    }
    assert_eq!(world.mapper::<Pos>().count(), usize::from(present));
}

#[test]
fn reentrant_create_from_hook() {
    let mut world = WorldBuilder::new()
        .register::<Pos>()
        .register_with_hooks::<Vel>(ComponentHooks::new().on_add(|world, _| {
            world.create(|entity| {
                entity.add(Pos(0));
            });
        }))
        .build();

    world.create(|entity| {
        entity.add(Vel(0));
    });
    assert_eq!(world.entity_count(), 2);
    assert_eq!(world.mapper::<Pos>().count(), 1);
}

#[test]
fn systems_run_in_order_and_observe_prior_writes() {
    let mut world = WorldBuilder::new()
        .register::<Counter>()
        .family("counters", FamilySpec::new().all_of::<Counter>())
        .system(SystemDef::interval("inc", |world, _| {
            let family = world.family_by_name("counters").unwrap();
            world.for_each(family, |world, e| world.get_mut::<Counter>(e).0 += 1);
        }))
        .system(SystemDef::iterating(
            "double",
            FamilySpec::new().all_of::<Counter>(),
            |world, e, _| world.get_mut::<Counter>(e).0 *= 2,
        ))
        .build();

    let e = world.create(|entity| {
        entity.add(Counter(0));
    });
    world.update(0.0);
    assert_eq!(world.get::<Counter>(e).0, 2);
    world.update(0.0);
    assert_eq!(world.get::<Counter>(e).0, 6);
}

#[test]
fn interval_cadence_and_alpha() {
    let runs = Rc::new(RefCell::new(0));
    let alphas: Rc<RefCell<Vec<f32>>> = Rc::new(RefCell::new(Vec::new()));
    let runs_in = runs.clone();
    let alphas_in = alphas.clone();

    let mut world = WorldBuilder::new()
        .system(
            SystemDef::interval("fixed", move |_, _| *runs_in.borrow_mut() += 1)
                .every(2)
                .with_alpha(move |_, alpha| alphas_in.borrow_mut().push(alpha)),
        )
        .build();

    for _ in 0..4 {
        world.update(1.0);
    }
    assert_eq!(*runs.borrow(), 2);
    assert_eq!(*alphas.borrow(), vec![0.5, 0.5]);
}

#[test]
fn disabling_a_system_takes_effect_next_tick() {
    let runs = Rc::new(RefCell::new(0));
    let runs_in = runs.clone();
    let mut world = WorldBuilder::new()
        .system(SystemDef::interval("once", move |world, _| {
            *runs_in.borrow_mut() += 1;
            world.enable_system("once", false);
        }))
        .build();

    world.update(0.0);
    world.update(0.0);
    world.update(0.0);
    assert_eq!(*runs.borrow(), 1);

    world.enable_system("once", true);
    world.update(0.0);
    assert_eq!(*runs.borrow(), 2);
}

#[test]
fn systems_starting_disabled_do_not_run() {
    let runs = Rc::new(RefCell::new(0));
    let runs_in = runs.clone();
    let mut world = WorldBuilder::new()
        .system(
            SystemDef::interval("off", move |_, _| *runs_in.borrow_mut() += 1).enabled(false),
        )
        .build();

    world.update(0.0);
    assert_eq!(*runs.borrow(), 0);
}

#[test]
fn sorted_iteration_follows_comparator() {
    let order: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
    let order_in = order.clone();
    let mut world = WorldBuilder::new()
        .register::<Pos>()
        .system(
            SystemDef::iterating(
                "walk",
                FamilySpec::new().all_of::<Pos>(),
                move |world, e, _| order_in.borrow_mut().push(world.get::<Pos>(e).0),
            )
            .sorted_by(|world, a, b| world.get::<Pos>(a).0.cmp(&world.get::<Pos>(b).0)),
        )
        .build();

    for value in [5, 1, 3] {
        world.create(|entity| {
            entity.add(Pos(value));
        });
    }

    world.update(0.0);
    assert_eq!(*order.borrow(), vec![1, 3, 5]);

    // Nothing changed: the sorted view is reused without a re-sort.
    order.borrow_mut().clear();
    world.update(0.0);
    assert_eq!(*order.borrow(), vec![1, 3, 5]);
}

#[test]
fn sorted_system_does_not_disturb_unsorted_consumers_of_the_same_family() {
    let order: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
    let order_in = order.clone();
    let mut world = WorldBuilder::new()
        .register::<Pos>()
        .system(
            SystemDef::iterating(
                "walk",
                FamilySpec::new().all_of::<Pos>(),
                move |world, e, _| order_in.borrow_mut().push(world.get::<Pos>(e).0),
            )
            .sorted_by(|world, a, b| world.get::<Pos>(a).0.cmp(&world.get::<Pos>(b).0)),
        )
        .build();

    let family = world.family(&FamilySpec::new().all_of::<Pos>());
    for value in [5, 1, 3] {
        world.create(|entity| {
            entity.add(Pos(value));
        });
    }

    // An unsorted pass over the shared family rebuilds its cache first.
    let mut unsorted = Vec::new();
    world.for_each(family, |world, e| unsorted.push(world.get::<Pos>(e).0));
    assert_eq!(unsorted, vec![3, 1, 5]);

    // The sorted system still iterates in comparator order.
    world.update(0.0);
    assert_eq!(*order.borrow(), vec![1, 3, 5]);

    // And the shared cache keeps its id order for unsorted consumers.
    unsorted.clear();
    world.for_each(family, |world, e| unsorted.push(world.get::<Pos>(e).0));
    assert_eq!(unsorted, vec![3, 1, 5]);
}

#[test]
fn iterating_system_applies_deferred_destroy_after_its_pass() {
    let mut world = WorldBuilder::new()
        .register::<Pos>()
        .system(SystemDef::iterating(
            "reaper",
            FamilySpec::new().all_of::<Pos>(),
            |world, e, _| {
                world.remove(e).unwrap();
                assert!(world.is_alive(e));
            },
        ))
        .build();

    let family = world.family(&FamilySpec::new().all_of::<Pos>());
    world.create(|entity| {
        entity.add(Pos(0));
    });
    world.create(|entity| {
        entity.add(Pos(1));
    });

    world.update(0.0);
    assert_eq!(world.entity_count(), 0);
    assert_eq!(world.family_len(family), 0);
}

#[test]
fn factory_systems_resolve_injected_dependencies() {
    let mut world = WorldBuilder::new()
        .register::<Pos>()
        .inject("step", 7i32)
        .system(SystemDef::iterating_from(
            "stepper",
            FamilySpec::new().all_of::<Pos>(),
            |injections| {
                let step = *injections.get::<i32>("step");
                Box::new(move |world: &mut World, e: Entity, _| {
                    world.get_mut::<Pos>(e).0 += step;
                })
            },
        ))
        .build();

    let e = world.create(|entity| {
        entity.add(Pos(0));
    });
    world.update(0.0);
    assert_eq!(world.get::<Pos>(e).0, 7);
    assert_eq!(*world.injected::<i32>("step"), 7);
    assert!(world.try_injected::<i32>("missing").is_none());
}

#[test]
fn edit_facade_scopes_component_access() {
    let mut world = base_world();
    let e = world.create(|_| {});

    let mut edit = world.edit(e);
    edit.add(Pos(4)).add(Vel(2));
    assert!(edit.has::<Pos>());
    assert_eq!(edit.get::<Pos>().0, 4);
    edit.get_mut::<Pos>().0 += 1;
    edit.remove::<Vel>();

    assert_eq!(world.get::<Pos>(e).0, 5);
    assert!(!world.has::<Vel>(e));
}

#[test]
fn state_triple_is_exposed() {
    let mut world = base_world();
    let e = world.create(|entity| {
        entity.add(Pos(3));
    });

    assert!(world.alive_mask().get(e.id()));
    assert!(world
        .component_names()
        .iter()
        .any(|name| name.ends_with("Pos")));
    let pairs: Vec<(Entity, i32)> = world.mapper::<Pos>().iter().map(|(e, v)| (e, v.0)).collect();
    assert_eq!(pairs, vec![(e, 3)]);
}

#[should_panic(expected = "registered twice")]
#[test]
fn duplicate_component_registration_panics() {
    WorldBuilder::new().register::<Pos>().register::<Pos>().build();
}

#[should_panic(expected = "registered twice")]
#[test]
fn duplicate_system_name_panics() {
    WorldBuilder::new()
        .system(SystemDef::interval("tick", |_, _| {}))
        .system(SystemDef::interval("tick", |_, _| {}))
        .build();
}

#[should_panic(expected = "registered twice")]
#[test]
fn duplicate_family_name_panics() {
    WorldBuilder::new()
        .register::<Pos>()
        .family("movers", FamilySpec::new().all_of::<Pos>())
        .family("movers", FamilySpec::new().all_of::<Pos>())
        .build();
}

#[should_panic(expected = "never registered")]
#[test]
fn unknown_component_type_in_family_panics() {
    let mut world = WorldBuilder::new().build();
    world.family(&FamilySpec::new().all_of::<Pos>());
}

#[should_panic(expected = "two of its sets")]
#[test]
fn overlapping_family_sets_panic() {
    let mut world = base_world();
    world.family(&FamilySpec::new().all_of::<Pos>().none_of::<Pos>());
}

#[should_panic(expected = "never registered")]
#[test]
fn unregistered_component_insert_panics() {
    let mut world = WorldBuilder::new().build();
    let e = world.create(|_| {});
    world.insert(e, Pos(0));
}
