use anonymous_communication_protocols::participant::Participant;
use anonymous_communication_protocols::transport::local::LocalTransport;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::{criterion_group, criterion_main};

const SECURITY: usize = 3;

fn ids(nparties: usize) -> Vec<String> {
    (1..=nparties).map(|i| i.to_string()).collect()
}

fn run_parties<F>(nparties: usize, routine: F)
where
    F: Fn(Participant<LocalTransport>, usize) + Clone + Send + 'static,
{
    let ids = ids(nparties);
    let id_refs = ids.iter().map(String::as_str).collect::<Vec<_>>();
    let participants = Participant::connect_local(&id_refs);
    let handles = participants
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let routine = routine.clone();
            std::thread::spawn(move || routine(p, i))
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }
}

fn bench_parity(c: &mut Criterion) {
    let mut group = c.benchmark_group("parity_time");
    for nparties in [2, 3, 5] {
        group.bench_with_input(
            BenchmarkId::new("LocalMesh", nparties),
            &nparties,
            |b, &nparties| {
                b.iter(|| {
                    run_parties(nparties, |mut p, i| {
                        let mut rng = rand::thread_rng();
                        p.set_parity_input(i == 0);
                        p.execute_parity(&mut rng).unwrap();
                    })
                })
            },
        );
    }
    group.finish();
}

fn bench_veto(c: &mut Criterion) {
    let mut group = c.benchmark_group("veto_time");
    for nparties in [2, 3, 5] {
        group.bench_with_input(
            BenchmarkId::new("LocalMesh", nparties),
            &nparties,
            |b, &nparties| {
                b.iter(|| {
                    run_parties(nparties, |mut p, i| {
                        let mut rng = rand::thread_rng();
                        p.set_veto_input(i == 0);
                        p.execute_veto(SECURITY, &mut rng).unwrap();
                    })
                })
            },
        );
    }
    group.finish();
}

fn bench_collision_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision_detection_time");
    for nparties in [2, 3, 5] {
        group.bench_with_input(
            BenchmarkId::new("LocalMesh", nparties),
            &nparties,
            |b, &nparties| {
                b.iter(|| {
                    run_parties(nparties, |mut p, i| {
                        let mut rng = rand::thread_rng();
                        p.set_collision_detection_input(i == 0);
                        p.execute_collision_detection(SECURITY, &mut rng).unwrap();
                    })
                })
            },
        );
    }
    group.finish();
}

fn bench_message_transmission(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_transmission_time");
    for nparties in [3, 5] {
        group.bench_with_input(
            BenchmarkId::new("LocalMesh", nparties),
            &nparties,
            |b, &nparties| {
                b.iter(|| {
                    run_parties(nparties, |mut p, i| {
                        let mut rng = rand::thread_rng();
                        if i == 0 {
                            p.set_message_input("Hi all!!").unwrap();
                            p.set_notification_input(Some("2")).unwrap();
                        }
                        p.execute_message_transmission(SECURITY, &mut rng).unwrap();
                    })
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    name = time_benches;
    config = Criterion::default().sample_size(10);
    targets = bench_parity, bench_veto, bench_collision_detection, bench_message_transmission
);
criterion_main!(time_benches);

// cargo bench parity_time
// cargo bench veto_time
// cargo bench collision_detection_time
// cargo bench message_transmission_time
