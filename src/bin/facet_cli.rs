#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!(
        "facet_cli requires `--features cli`.\n\
         Example: cargo run --bin facet_cli --features cli -- list"
    );
    std::process::exit(1);
}

#[cfg(feature = "cli")]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = native::run() {
        eprintln!("facet_cli error: {err}");
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
mod native {
    use facet_engine::facet::{
        BodyFacets, FacetContext, FacetOptions, PatchSide, SharedBoundary, WorkingFace, facet_body,
    };
    use facet_engine::geom::{
        BezierSurface, ConeSurface, CylinderSurface, FacetMesh, Interval, ParBox, PlaneSurface,
        Point3, SphereSurface, TorusSurface, Vec3,
    };
    use std::fs::{self, File};
    use std::io::{BufWriter, Write};
    use std::path::{Path, PathBuf};

    const USAGE: &str = r"facet_cli (facet-engine)

USAGE:
  facet_cli list
  facet_cli run <scenario|all> [options]

SCENARIOS:
  plane_strip
  cylinder
  sphere
  cone_apex
  torus
  bezier_bump
  two_patch_strip

OPTIONS (run):
  --config <path>    Read facet options from a JSON file (missing fields use defaults)
  --sag <value>      Override the sag tolerance
  --out-dir <dir>    Write <scenario>.obj to this dir (required for `all`)
  --obj <path>       Write OBJ (single scenario only)
  --json             Print diagnostics as JSON instead of text
  --overwrite        Overwrite existing output files
  -h, --help         Show this help
";

    pub fn run() -> Result<(), String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut args = Args::new(args);

        let Some(command) = args.next() else {
            print_usage();
            return Ok(());
        };

        match command.as_str() {
            "list" => {
                print_scenarios();
                Ok(())
            }
            "run" => cmd_run(&mut args),
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            other => Err(format!("unknown command `{other}`\n\n{USAGE}")),
        }
    }

    fn print_usage() {
        println!("{USAGE}");
    }

    fn print_scenarios() {
        for scenario in Scenario::ALL {
            println!("{:<16} {}", scenario.name(), scenario.description());
        }
    }

    struct RunSettings {
        options: FacetOptions,
        json: bool,
        overwrite: bool,
    }

    fn cmd_run(args: &mut Args) -> Result<(), String> {
        let scenario_name = args.next().ok_or("missing scenario name")?;

        let mut out_dir: Option<PathBuf> = None;
        let mut obj_path: Option<PathBuf> = None;
        let mut config: Option<PathBuf> = None;
        let mut sag: Option<f64> = None;
        let mut json = false;
        let mut overwrite = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => config = Some(PathBuf::from(args.value("--config")?)),
                "--sag" => {
                    let raw = args.value("--sag")?;
                    sag = Some(raw.parse().map_err(|e| format!("invalid --sag `{raw}`: {e}"))?);
                }
                "--out-dir" => out_dir = Some(PathBuf::from(args.value("--out-dir")?)),
                "--obj" => obj_path = Some(PathBuf::from(args.value("--obj")?)),
                "--json" => json = true,
                "--overwrite" => overwrite = true,
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }

        let mut options = match config.as_deref() {
            Some(path) => read_options(path)?,
            None => FacetOptions::new(),
        };
        if sag.is_some() {
            options.max_sag = sag;
        }
        options.validate().map_err(|e| e.to_string())?;
        let settings = RunSettings {
            options,
            json,
            overwrite,
        };

        if let Some(dir) = out_dir.as_ref() {
            if obj_path.is_some() {
                return Err("use either --out-dir or --obj (not both)".to_string());
            }
            fs::create_dir_all(dir).map_err(|e| format!("create out dir: {e}"))?;

            if scenario_name == "all" {
                for scenario in Scenario::ALL {
                    let path = dir.join(format!("{}.obj", scenario.name()));
                    run_one(*scenario, Some(&path), &settings)?;
                }
                return Ok(());
            }
            let scenario =
                Scenario::from_str(&scenario_name).ok_or_else(|| unknown_scenario(&scenario_name))?;
            let path = dir.join(format!("{}.obj", scenario.name()));
            return run_one(scenario, Some(&path), &settings);
        }

        if scenario_name == "all" {
            return Err("`run all` requires --out-dir".to_string());
        }
        let scenario =
            Scenario::from_str(&scenario_name).ok_or_else(|| unknown_scenario(&scenario_name))?;
        run_one(scenario, obj_path.as_deref(), &settings)
    }

    fn run_one(
        scenario: Scenario,
        obj: Option<&Path>,
        settings: &RunSettings,
    ) -> Result<(), String> {
        let facets = run_scenario(scenario, &settings.options)?;

        if settings.json {
            let text = serde_json::to_string_pretty(&facets.diagnostics)
                .map_err(|e| format!("diagnostics json: {e}"))?;
            println!("{text}");
        } else {
            print!("{}", facets.diagnostics);
        }

        if let Some(path) = obj {
            write_obj_file(path, &facets.mesh, scenario.name(), settings.overwrite)?;
            eprintln!("wrote {}", path.display());
        }

        eprintln!(
            "{}: vertices={} triangles={} | {}",
            scenario.name(),
            facets.mesh.vertex_count(),
            facets.mesh.triangle_count(),
            facets.diagnostics.summary()
        );
        Ok(())
    }

    fn read_options(path: &Path) -> Result<FacetOptions, String> {
        let text = fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;
        serde_json::from_str(&text).map_err(|e| format!("parse {}: {e}", path.display()))
    }

    fn unknown_scenario(name: &str) -> String {
        let mut msg = format!("unknown scenario `{name}`\n\navailable scenarios:\n");
        for scenario in Scenario::ALL {
            msg.push_str("  ");
            msg.push_str(scenario.name());
            msg.push('\n');
        }
        msg
    }

    fn write_obj_file(
        path: &Path,
        mesh: &FacetMesh,
        name: &str,
        overwrite: bool,
    ) -> Result<(), String> {
        mesh.validate().map_err(|e| format!("mesh validation failed: {e}"))?;

        if path.exists() && !overwrite {
            return Err(format!(
                "refusing to overwrite existing file {} (use --overwrite)",
                path.display()
            ));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("create dir {}: {e}", parent.display()))?;
        }

        let file = File::create(path).map_err(|e| format!("create {}: {e}", path.display()))?;
        let mut w = BufWriter::new(file);

        writeln!(w, "# facet-engine facet_cli").map_err(|e| format!("write obj: {e}"))?;
        writeln!(w, "o {name}").map_err(|e| format!("write obj: {e}"))?;

        for p in &mesh.positions {
            writeln!(w, "v {} {} {}", p[0], p[1], p[2]).map_err(|e| format!("write obj: {e}"))?;
        }
        if let Some(normals) = mesh.normals.as_ref() {
            for n in normals {
                writeln!(w, "vn {} {} {}", n[0], n[1], n[2])
                    .map_err(|e| format!("write obj: {e}"))?;
            }
        }

        let has_normals = mesh.normals.is_some();
        for tri in mesh.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] + 1, tri[1] + 1, tri[2] + 1);
            if has_normals {
                writeln!(w, "f {a}//{a} {b}//{b} {c}//{c}")
            } else {
                writeln!(w, "f {a} {b} {c}")
            }
            .map_err(|e| format!("write obj: {e}"))?;
        }

        w.flush().map_err(|e| format!("flush {}: {e}", path.display()))
    }

    #[derive(Debug, Clone, Copy)]
    enum Scenario {
        PlaneStrip,
        Cylinder,
        Sphere,
        ConeApex,
        Torus,
        BezierBump,
        TwoPatchStrip,
    }

    impl Scenario {
        const ALL: &'static [Scenario] = &[
            Scenario::PlaneStrip,
            Scenario::Cylinder,
            Scenario::Sphere,
            Scenario::ConeApex,
            Scenario::Torus,
            Scenario::BezierBump,
            Scenario::TwoPatchStrip,
        ];

        fn name(self) -> &'static str {
            match self {
                Scenario::PlaneStrip => "plane_strip",
                Scenario::Cylinder => "cylinder",
                Scenario::Sphere => "sphere",
                Scenario::ConeApex => "cone_apex",
                Scenario::Torus => "torus",
                Scenario::BezierBump => "bezier_bump",
                Scenario::TwoPatchStrip => "two_patch_strip",
            }
        }

        fn description(self) -> &'static str {
            match self {
                Scenario::PlaneStrip => "10 x 1 plane, 1.0 edge limit",
                Scenario::Cylinder => "R=5 H=10 cylinder",
                Scenario::Sphere => "R=2 sphere with poles",
                Scenario::ConeApex => "cone closing to an apex",
                Scenario::Torus => "R=3 r=1 torus",
                Scenario::BezierBump => "biquadratic patch with a central bump",
                Scenario::TwoPatchStrip => "plane and bump sharing an edge",
            }
        }

        fn from_str(name: &str) -> Option<Self> {
            Scenario::ALL.iter().copied().find(|s| s.name() == name)
        }
    }

    fn single<S>(surface: S, options: &FacetOptions) -> Result<BodyFacets, String>
    where
        S: facet_engine::geom::Surface + Sync + 'static,
    {
        let face = WorkingFace::new(&surface);
        facet_body(&[face], &[], options, &FacetContext::new()).map_err(|e| e.to_string())
    }

    fn bump(origin_x: f64, height: f64) -> Result<BezierSurface, String> {
        let mut points = Vec::with_capacity(9);
        for i in 0..3 {
            for j in 0..3 {
                let z = if i == 1 && j == 1 { height } else { 0.0 };
                points.push(Point3::new(origin_x + i as f64, 2.0 * j as f64, z));
            }
        }
        BezierSurface::new(points, 2, 2)
    }

    fn run_scenario(scenario: Scenario, options: &FacetOptions) -> Result<BodyFacets, String> {
        match scenario {
            Scenario::PlaneStrip => {
                let (length, width) = (Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
                let plane = PlaneSurface::new(Point3::ORIGIN, length, width);
                let mut options = options.clone();
                options.max_edge_length = Some(1.0);
                single(plane, &options)
            }
            Scenario::Cylinder => single(
                CylinderSurface::new(Point3::ORIGIN, Vec3::new(0.0, 0.0, 10.0), 5.0)?,
                options,
            ),
            Scenario::Sphere => single(SphereSurface::new(Point3::ORIGIN, 2.0)?, options),
            Scenario::ConeApex => single(
                ConeSurface::new(Point3::ORIGIN, Vec3::new(0.0, 0.0, 3.0), 2.0, 0.0)?,
                options,
            ),
            Scenario::Torus => {
                single(TorusSurface::new(Point3::ORIGIN, Vec3::Z, 3.0, 1.0)?, options)
            }
            Scenario::BezierBump => single(bump(0.0, 1.5)?, options),
            Scenario::TwoPatchStrip => {
                let (width, length) = (Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 4.0, 0.0));
                let plane = PlaneSurface::new(Point3::ORIGIN, width, length);
                let bump = bump(1.0, 1.5)?;
                let faces = [
                    WorkingFace::new(&plane),
                    WorkingFace::new(&bump)
                        .with_region(ParBox::new(Interval::new(0.0, 1.0), Interval::new(0.0, 1.0))),
                ];
                let shared = [SharedBoundary {
                    face_a: 0,
                    side_a: PatchSide::UMax,
                    face_b: 1,
                    side_b: PatchSide::UMin,
                    reversed: false,
                }];
                facet_body(&faces, &shared, options, &FacetContext::new())
                    .map_err(|e| e.to_string())
            }
        }
    }

    struct Args {
        args: Vec<String>,
        pos: usize,
    }

    impl Args {
        fn new(args: Vec<String>) -> Self {
            Self { args, pos: 0 }
        }

        fn next(&mut self) -> Option<String> {
            let arg = self.args.get(self.pos)?.clone();
            self.pos += 1;
            Some(arg)
        }

        fn value(&mut self, flag: &str) -> Result<String, String> {
            self.next().ok_or_else(|| format!("missing value for {flag}"))
        }
    }
}
