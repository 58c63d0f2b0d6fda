//! Launcher and test-runner wrapper scripts.
//!
//! Each generator writes one executable `#!/bin/sh` script. Paths baked into
//! scripts are made absolute so the script works from any directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Settings;
use crate::generator::{require_args, Generator};
use crate::jar::{file_name, open_jar};
use crate::output;

const SCRIPT_HEADER: &str = "#!/bin/sh\n# Auto generated wrapper shell script\n";

/// Set by the test runner to enable coverage instrumentation.
pub const COVERAGE_ENV: &str = "BUILD_COVERAGE";
/// JaCoCo agent jar used for coverage runs.
pub const JACOCO_AGENT_ENV: &str = "JACOCOAGENT";
/// Wire placeholder for "no packages under test".
const NO_PACKAGES: &str = "__targetundertestpkg__";

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolving current directory")?;
    Ok(cwd.join(path))
}

fn join_classpath(jars: &[PathBuf]) -> String {
    jars.iter()
        .map(|j| j.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

/// Test classes in `jar`: top-level classes named `*Test` (but not `Test`).
pub fn test_class_names(jar: &Path) -> Result<Vec<String>> {
    const SUFFIX: &str = "Test.class";
    let jar = open_jar(jar)?;
    let mut names = Vec::new();
    for name in jar.file_names() {
        let base = name.rsplit('/').next().unwrap_or(name);
        if base.ends_with(SUFFIX) && base.len() > SUFFIX.len() && !base.contains('$') {
            let class = name.replace('/', ".");
            names.push(class[..class.len() - ".class".len()].to_string());
        }
    }
    Ok(names)
}

/// `-javaagent` flag for coverage of `packages`, if an agent is configured.
fn coverage_flag(packages: &str, agent: Option<&str>) -> Result<String> {
    let agent = match agent.filter(|a| !a.is_empty()) {
        Some(a) if !packages.is_empty() => absolute(Path::new(a))?,
        _ => return Ok(String::new()),
    };
    let includes = packages
        .split(':')
        .filter(|p| !p.is_empty())
        .map(|p| format!("{p}.*"))
        .collect::<Vec<_>>()
        .join(":");
    Ok(format!(
        "-javaagent:{}=includes={includes},output=file",
        agent.display()
    ))
}

pub struct JavaBinaryGenerator;

impl Generator for JavaBinaryGenerator {
    fn name(&self) -> &'static str {
        "java_binary"
    }

    /// `<script> <onejar>`
    fn run(&self, args: &[String], settings: &Settings) -> Result<()> {
        require_args("java_binary", args, 2, "<script> <onejar>")?;
        let script = Path::new(&args[0]);
        let jar = Path::new(&args[1]);
        let text = format!(
            "{SCRIPT_HEADER}\n\
             jar=`dirname \"$0\"`/\"{}\"\n\
             if [ ! -f \"$jar\" ]; then\n\
             \x20 jar=\"{}\"\n\
             fi\n\
             \n\
             exec {} -jar \"$jar\" $@\n",
            file_name(jar)?,
            absolute(jar)?.display(),
            settings.java,
        );
        output::write_script(script, &text)?;
        info!(script = %script.display(), "java launcher written");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct JavaTestSpec {
    pub main_class: String,
    pub packages: String,
    pub script: PathBuf,
    pub test_jar: PathBuf,
    /// Full classpath, starting with the test jar.
    pub classpath: Vec<PathBuf>,
}

impl JavaTestSpec {
    /// Parse `<main-class> <packages> <script> <test-jar> <jar>...`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        require_args(
            "java_test",
            args,
            4,
            "<main-class> <packages> <script> <test-jar> <jar>...",
        )?;
        let packages = if args[1] == NO_PACKAGES { "" } else { args[1].as_str() };
        Ok(Self {
            main_class: args[0].clone(),
            packages: packages.to_string(),
            script: PathBuf::from(&args[2]),
            test_jar: PathBuf::from(&args[3]),
            classpath: args[3..].iter().map(PathBuf::from).collect(),
        })
    }

    pub fn render(&self, settings: &Settings, agent: Option<&str>) -> Result<String> {
        let tests = test_class_names(&self.test_jar)?.join(" ");
        Ok(format!(
            "{SCRIPT_HEADER}\n\
             if [ -n \"${COVERAGE_ENV}\" ]\n\
             then\n\
             \x20 coverage_options=\"{}\"\n\
             fi\n\
             \n\
             exec {} $coverage_options -classpath {} {} {} $@\n",
            coverage_flag(&self.packages, agent)?,
            settings.java,
            join_classpath(&self.classpath),
            self.main_class,
            tests,
        ))
    }
}

pub struct JavaTestGenerator;

impl Generator for JavaTestGenerator {
    fn name(&self) -> &'static str {
        "java_test"
    }

    fn run(&self, args: &[String], settings: &Settings) -> Result<()> {
        let spec = JavaTestSpec::from_args(args)?;
        let agent = std::env::var(JACOCO_AGENT_ENV).ok();
        let text = spec
            .render(settings, agent.as_deref())
            .with_context(|| format!("scanning tests in {}", spec.test_jar.display()))?;
        output::write_script(&spec.script, &text)?;
        info!(script = %spec.script.display(), "java test runner written");
        Ok(())
    }
}

pub struct ScalaTestGenerator;

impl Generator for ScalaTestGenerator {
    fn name(&self) -> &'static str {
        "scala_test"
    }

    /// `<java> <scala> <script> <test-jar> <jar>...`
    fn run(&self, args: &[String], _settings: &Settings) -> Result<()> {
        require_args(
            "scala_test",
            args,
            4,
            "<java> <scala> <script> <test-jar> <jar>...",
        )?;
        let java = absolute(Path::new(&args[0]))?;
        let scala = absolute(Path::new(&args[1]))?;
        let script = Path::new(&args[2]);
        let test_jar = Path::new(&args[3]);
        let classpath: Vec<PathBuf> = args[3..].iter().map(PathBuf::from).collect();
        let tests = test_class_names(test_jar)
            .with_context(|| format!("scanning tests in {}", test_jar.display()))?;

        let text = format!(
            "{SCRIPT_HEADER}\n\
             JAVACMD={} exec {} -classpath {} org.scalatest.run {} $@\n\n",
            java.display(),
            scala.display(),
            join_classpath(&classpath),
            tests.join(" "),
        );
        output::write_script(script, &text)?;
        info!(script = %script.display(), "scala test runner written");
        Ok(())
    }
}

pub struct ShellTestGenerator;

impl Generator for ShellTestGenerator {
    fn name(&self) -> &'static str {
        "shell_test"
    }

    /// `<wrapper> <script>...`
    fn run(&self, args: &[String], _settings: &Settings) -> Result<()> {
        require_args("shell_test", args, 1, "<wrapper> <script>...")?;
        let wrapper = Path::new(&args[0]);
        let sources = args[1..]
            .iter()
            .map(|s| Ok(format!(". {}", absolute(Path::new(s))?.display())))
            .collect::<Result<Vec<_>>>()?;
        let text = format!("{SCRIPT_HEADER}\nset -e\n\n{}\n\n", sources.join("\n"));
        output::write_script(wrapper, &text)?;
        info!(wrapper = %wrapper.display(), scripts = sources.len(), "shell test wrapper written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jar::testutil::make_jar;
    use std::fs;
    use tempfile::TempDir;

    fn test_jar(dir: &Path) -> PathBuf {
        let jar = dir.join("tests.jar");
        make_jar(
            &jar,
            &[
                ("com/example/FooTest.class", b""),
                ("com/example/FooTest$Inner.class", b""),
                ("com/example/Test.class", b""),
                ("com/example/Helper.class", b""),
            ],
        );
        jar
    }

    #[test]
    fn discovers_top_level_test_classes() {
        let temp = TempDir::new().unwrap();
        let names = test_class_names(&test_jar(temp.path())).unwrap();
        assert_eq!(names, ["com.example.FooTest"]);
    }

    #[test]
    fn coverage_flag_needs_agent_and_packages() {
        assert_eq!(coverage_flag("com.a", None).unwrap(), "");
        assert_eq!(coverage_flag("", Some("/opt/jacoco.jar")).unwrap(), "");
        assert_eq!(
            coverage_flag("com.a:com.b", Some("/opt/jacoco.jar")).unwrap(),
            "-javaagent:/opt/jacoco.jar=includes=com.a.*:com.b.*,output=file"
        );
    }

    #[test]
    fn java_test_script_runs_discovered_tests() {
        let temp = TempDir::new().unwrap();
        let jar = test_jar(temp.path());
        let script = temp.path().join("run_test");
        let args = vec![
            "org.junit.runner.JUnitCore".to_string(),
            NO_PACKAGES.to_string(),
            script.to_string_lossy().into_owned(),
            jar.to_string_lossy().into_owned(),
            "/deps/junit.jar".to_string(),
        ];

        let spec = JavaTestSpec::from_args(&args).unwrap();
        let text = spec.render(&Settings::default(), None).unwrap();

        assert!(text.starts_with("#!/bin/sh\n"));
        assert!(text.contains("coverage_options=\"\""));
        assert!(text.contains(&format!(
            "exec java $coverage_options -classpath {}:/deps/junit.jar org.junit.runner.JUnitCore com.example.FooTest $@\n",
            jar.display()
        )));
    }

    #[test]
    fn java_binary_falls_back_to_absolute_jar() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("app");
        let jar = temp.path().join("app.one.jar");
        let args = vec![
            script.to_string_lossy().into_owned(),
            jar.to_string_lossy().into_owned(),
        ];

        JavaBinaryGenerator.run(&args, &Settings::default()).unwrap();

        let text = fs::read_to_string(&script).unwrap();
        assert!(text.contains("jar=`dirname \"$0\"`/\"app.one.jar\"\n"));
        assert!(text.contains(&format!("  jar=\"{}\"\n", jar.display())));
        assert!(text.ends_with("exec java -jar \"$jar\" $@\n"));
    }

    #[test]
    fn shell_test_sources_each_script() {
        let temp = TempDir::new().unwrap();
        let wrapper = temp.path().join("wrapper");
        let args = vec![
            wrapper.to_string_lossy().into_owned(),
            "/t/a.sh".to_string(),
            "/t/b.sh".to_string(),
        ];

        ShellTestGenerator.run(&args, &Settings::default()).unwrap();

        let text = fs::read_to_string(&wrapper).unwrap();
        assert!(text.contains("set -e\n\n. /t/a.sh\n. /t/b.sh\n"));
    }

    #[test]
    fn scala_test_uses_absolute_launchers() {
        let temp = TempDir::new().unwrap();
        let jar = test_jar(temp.path());
        let script = temp.path().join("run_scala");
        let args = vec![
            "/usr/bin/java".to_string(),
            "/opt/scala/bin/scala".to_string(),
            script.to_string_lossy().into_owned(),
            jar.to_string_lossy().into_owned(),
        ];

        ScalaTestGenerator.run(&args, &Settings::default()).unwrap();

        let text = fs::read_to_string(&script).unwrap();
        assert!(text.contains("JAVACMD=/usr/bin/java exec /opt/scala/bin/scala -classpath "));
        assert!(text.contains("org.scalatest.run com.example.FooTest $@"));
    }
}
