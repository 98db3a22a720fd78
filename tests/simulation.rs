use metaballs_wasm::geometry::Rect;
use metaballs_wasm::simulation::{advance, bounce_off_rects, Metaball, Simulation};
use rand::rngs::SmallRng;
use rand::SeedableRng;

const TOL: f32 = 1e-3;

#[test]
fn bounce_scenario_stays_on_canvas_and_off_the_obstacle() {
    let (w, h) = (800.0, 600.0);
    let rect = Rect::new(100.0, 100.0, 50.0, 50.0);
    let mut rng = SmallRng::seed_from_u64(42);
    let mut sim = Simulation::new(&mut rng, 10, w, h, 1.0);

    for frame in 0..1000 {
        sim.step(Some(&[rect]));
        for b in sim.balls() {
            assert!(b.x >= 0.0 && b.x <= w, "frame {}: x={}", frame, b.x);
            assert!(b.y >= 0.0 && b.y <= h, "frame {}: y={}", frame, b.y);
            assert!(
                rect.distance_to(b.x, b.y) >= b.r - TOL,
                "frame {}: ball at ({}, {}) r={} overlaps",
                frame,
                b.x,
                b.y,
                b.r
            );
        }
    }
}

#[test]
fn edge_overshoot_is_at_most_one_frame() {
    let (w, h) = (640.0, 360.0);
    let mut rng = SmallRng::seed_from_u64(3);
    let mut sim = Simulation::new(&mut rng, 25, w, h, 6.0);

    for _ in 0..5000 {
        sim.step(None);
        for b in sim.balls() {
            let sx = b.vx.abs() + TOL;
            let sy = b.vy.abs() + TOL;
            assert!(b.x >= b.r - sx && b.x <= w - b.r + sx);
            assert!(b.y >= b.r - sy && b.y <= h - b.r + sy);
        }
    }
}

#[test]
fn overshoot_is_corrected_on_the_next_step() {
    let mut b = Metaball { x: 21.0, y: 300.0, vx: -1.5, vy: 0.0, r: 20.0 };
    advance(&mut b, 800.0, 600.0);
    assert!(b.x < b.r);
    assert_eq!(b.vx, 1.5);
    advance(&mut b, 800.0, 600.0);
    assert!(b.x >= b.r);
    assert_eq!(b.vx, 1.5);
}

#[test]
fn every_case_leaves_the_ball_clear_of_the_rect() {
    let rect = Rect::new(200.0, 200.0, 120.0, 80.0);
    let mut rng = SmallRng::seed_from_u64(11);
    let mut sim = Simulation::new(&mut rng, 0, 1.0, 1.0, 0.0);
    assert!(sim.is_empty());

    // Sweep a grid of centres across and around the rect.
    for ix in 0..=60 {
        for iy in 0..=50 {
            let mut b = Metaball {
                x: 170.0 + ix as f32 * 3.0,
                y: 170.0 + iy as f32 * 3.0,
                vx: 0.8,
                vy: -0.6,
                r: 18.0,
            };
            bounce_off_rects(&mut b, &[rect]);
            assert!(
                rect.distance_to(b.x, b.y) >= b.r - TOL,
                "({}, {}) left at ({}, {})",
                ix,
                iy,
                b.x,
                b.y
            );
        }
    }

    sim.step(Some(&[rect]));
    assert!(sim.balls().is_empty());
}

#[test]
fn disjoint_rects_are_all_cleared() {
    let rects = [
        Rect::new(100.0, 100.0, 50.0, 50.0),
        Rect::new(400.0, 300.0, 80.0, 30.0),
        Rect::new(600.0, 50.0, 20.0, 200.0),
    ];
    let mut rng = SmallRng::seed_from_u64(99);
    let mut sim = Simulation::new(&mut rng, 40, 800.0, 600.0, 3.0);
    for _ in 0..2000 {
        sim.step(Some(&rects));
        for b in sim.balls() {
            for rect in &rects {
                assert!(rect.distance_to(b.x, b.y) >= b.r - TOL);
            }
        }
    }
}

#[test]
fn overlapping_rects_are_corrected_in_order() {
    // The second rect undoes part of the first push-out; the last rect wins.
    let first = Rect::new(100.0, 100.0, 50.0, 50.0);
    let second = Rect::new(80.0, 100.0, 30.0, 50.0);
    let mut b = Metaball { x: 105.0, y: 125.0, vx: 1.0, vy: 0.0, r: 10.0 };
    bounce_off_rects(&mut b, &[first, second]);
    assert_eq!(b.x, 70.0);
    assert!(second.distance_to(b.x, b.y) >= b.r - TOL);
}

#[test]
fn empty_obstacle_list_matches_plain_motion() {
    let mut a = Simulation::new(&mut SmallRng::seed_from_u64(5), 12, 800.0, 600.0, 2.0);
    let mut b = Simulation::new(&mut SmallRng::seed_from_u64(5), 12, 800.0, 600.0, 2.0);
    for _ in 0..500 {
        a.step(None);
        b.step(Some(&[]));
    }
    assert_eq!(a.balls(), b.balls());
}
