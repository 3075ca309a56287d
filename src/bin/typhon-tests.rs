use std::fs;
use std::io;
use std::path::Path;

use instant::Instant;
use typhon::runtime_io::BufferIo;
use typhon::Session;

fn expected_value(src: &str) -> Option<&str> {
    src.lines()
        .filter_map(|line| line.strip_prefix("# expect:"))
        .map(str::trim)
        .last()
}

fn main() -> io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let filter = args.first().map(|s| s.as_str());
    let dir = Path::new("tests/programs");
    if !dir.exists() {
        eprintln!("tests/programs not found.");
        return Ok(());
    }
    let mut entries = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "ty").unwrap_or(false))
        .collect::<Vec<_>>();
    entries.sort();

    let mut mismatches = 0;
    for path in entries {
        if let Some(f) = filter
            && !path.to_string_lossy().contains(f)
        {
            continue;
        }
        let path_str = path.to_string_lossy().to_string();
        println!("==== [{}] ====", path_str);
        let src = fs::read_to_string(&path)?;

        let session = Session::new();
        let t0 = Instant::now();
        let staged = session.stage(&src);
        let compile_ms = t0.elapsed().as_millis();
        let mut staged = match staged {
            Ok(staged) => staged,
            Err(e) => {
                println!("{}", e.render(&path_str, &src));
                println!("[compile] {} ms", compile_ms);
                println!();
                continue;
            }
        };

        let mut out = BufferIo::new();
        let t1 = Instant::now();
        let result = typhon::Vm::new()
            .run(&staged.image, &mut staged.store, &mut out)
            .and_then(|word| staged.store.value_of(word, &staged.result_type));
        let exec_ms = t1.elapsed().as_millis();
        print!("{}", out.get_output());

        match result {
            Ok(value) => {
                println!("=> {}", value);
                if let Some(expected) = expected_value(&src)
                    && expected != value.to_string()
                {
                    println!("!! expected {}", expected);
                    mismatches += 1;
                }
            }
            Err(e) => println!("{}", e.render(&path_str, &src)),
        }
        println!(
            "[vm] compile={} ms, exec={} ms, total={} ms",
            compile_ms,
            exec_ms,
            compile_ms + exec_ms
        );
        println!();
    }

    if mismatches > 0 {
        println!("{} program(s) returned an unexpected value", mismatches);
    }
    Ok(())
}
