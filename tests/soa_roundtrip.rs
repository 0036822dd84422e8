//! End-to-end: a SoA-declared component's fields round-trip through the
//! per-field escape hatch (`get_soa_field` / `set_soa_field`) rather than
//! the single-entity `T`-typed accessors, which only support AoS layouts.

use archetype_ecs::{PackWidth, World};

const COUNT: usize = 10_000;

#[repr(C)]
#[derive(Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[test]
fn soa_component_fields_round_trip_per_entity() {
    let mut world = World::new();
    let position_id = world.register_soa::<Position>(PackWidth::W8, &[4, 4, 4]);

    let mut entities = Vec::with_capacity(COUNT);
    for _ in 0..COUNT {
        let e = world.create_entity();
        world
            .add_component(e, Position { x: 0.0, y: 0.0, z: 0.0 })
            .unwrap();
        entities.push(e);
    }

    for (i, &e) in entities.iter().enumerate() {
        let v = i as f32;
        world.set_soa_field(e, position_id, 0, v).unwrap();
        world.set_soa_field(e, position_id, 1, v).unwrap();
        world.set_soa_field(e, position_id, 2, v).unwrap();
    }

    for (i, &e) in entities.iter().enumerate() {
        let v = i as f32;
        assert_eq!(world.get_soa_field::<f32>(e, position_id, 0).unwrap(), v);
        assert_eq!(world.get_soa_field::<f32>(e, position_id, 1).unwrap(), v);
        assert_eq!(world.get_soa_field::<f32>(e, position_id, 2).unwrap(), v);
    }
}
