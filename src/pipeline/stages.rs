//! Pipeline stage templates
//!
//! Shell commands for each compilation stage, rendered from the remote
//! toolchain layout and the target parameters, together with the output
//! each one must leave just above the sentinel.

use crate::config::PipelineConfig;
use crate::events::CompilerEvent;
use crate::session::CommandSpec;
use crate::terminal::ExpectedOutput;

/// Stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Write the source file
    StageSource,
    /// Compile to an object file
    CompileObject,
    /// Link into an executable
    LinkExecutable,
    /// Convert the executable to the flashable format
    ConvertArtifact,
    /// Print the artifact
    RetrieveArtifact,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 5] = [
        Stage::StageSource,
        Stage::CompileObject,
        Stage::LinkExecutable,
        Stage::ConvertArtifact,
        Stage::RetrieveArtifact,
    ];

    /// Stage name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Stage::StageSource => "stage source",
            Stage::CompileObject => "compile to object",
            Stage::LinkExecutable => "compile to link",
            Stage::ConvertArtifact => "convert to artifact format",
            Stage::RetrieveArtifact => "retrieve artifact",
        }
    }

    /// Event published when the stage succeeds
    pub fn completion_event(&self) -> Option<CompilerEvent> {
        match self {
            Stage::StageSource => Some(CompilerEvent::SourceStaged),
            Stage::CompileObject => Some(CompilerEvent::ObjectBuilt),
            Stage::LinkExecutable => Some(CompilerEvent::ArtifactLinked),
            Stage::ConvertArtifact => Some(CompilerEvent::ArtifactConverted),
            Stage::RetrieveArtifact => None,
        }
    }

    /// Result message when the stage fails
    pub fn failure_message(&self) -> &'static str {
        match self {
            Stage::StageSource => "Error while creating cpp file, aborting compilation...",
            Stage::CompileObject => "Error while compiling object file, aborting compilation...",
            Stage::LinkExecutable => "Error while compiling elf file, aborting compilation...",
            Stage::ConvertArtifact => "Error while compiling hex file, aborting compilation...",
            Stage::RetrieveArtifact => {
                "Error while retrieving hex file content, aborting compilation..."
            }
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved device and clock rate for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub device: String,
    pub clock_rate: String,
}

/// A stage with its rendered command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStage {
    pub stage: Stage,
    pub spec: CommandSpec,
}

/// Renders stage commands for one remote layout
#[derive(Debug, Clone)]
pub struct StageTemplates<'a> {
    layout: &'a PipelineConfig,
    work_prompt: &'a str,
}

impl<'a> StageTemplates<'a> {
    /// Create templates for a layout; `work_prompt` is the prompt printed in
    /// the working directory
    pub fn new(layout: &'a PipelineConfig, work_prompt: &'a str) -> Self {
        Self {
            layout,
            work_prompt,
        }
    }

    /// Render every stage in execution order
    pub fn plan(&self, source: &str, target: &Target) -> Vec<PipelineStage> {
        Stage::ALL
            .into_iter()
            .map(|stage| PipelineStage {
                stage,
                spec: self.render(stage, source, target),
            })
            .collect()
    }

    /// Render a single stage
    pub fn render(&self, stage: Stage, source: &str, target: &Target) -> CommandSpec {
        match stage {
            Stage::StageSource => self.stage_source(source),
            Stage::CompileObject => self.compile_object(target),
            Stage::LinkExecutable => self.link_executable(target),
            Stage::ConvertArtifact => self.convert_artifact(),
            Stage::RetrieveArtifact => self.retrieve_artifact(),
        }
    }

    fn path(&self, file: &str) -> String {
        format!("{}/{}", self.layout.work_dir, file)
    }

    fn stage_source(&self, source: &str) -> CommandSpec {
        let command = format!(
            "cd {dir}\ncat <<EOF > {cpp}\n#include <{header}>\n{source}\nEOF",
            dir = self.layout.work_dir,
            cpp = self.path("main.cpp"),
            header = self.layout.source_header,
        );
        CommandSpec::new(command, ExpectedOutput::lines(["> EOF"]))
    }

    fn compile_object(&self, target: &Target) -> CommandSpec {
        let cpp = self.path("main.cpp");
        let core = format!("{}/{}", self.layout.toolchain_root, target.device);
        let last_line = format!("    -c -o {} {}", self.path("main.o"), cpp);

        let command = [
            format!(r"sed -n 's/^#include <\([^>]*\)>/\1/p' {cpp} | sort -u > /tmp/included_headers.txt"),
            r"sed -i 's/\r$//' /tmp/included_headers.txt".to_string(),
            "touch /tmp/used_libraries.txt".to_string(),
            "while read header; do".to_string(),
            format!(r#"    lib_path=$(find {core}/externals -type f -name "$header" | head -n 1)"#),
            r#"    if [[ -n "$lib_path" ]]; then"#.to_string(),
            r#"        dirname "$lib_path" >> /tmp/used_libraries.txt"#.to_string(),
            "    fi".to_string(),
            "done < /tmp/included_headers.txt".to_string(),
            "sort -u /tmp/used_libraries.txt -o /tmp/used_libraries.txt".to_string(),
            r#"INCLUDE_PATHS=$(awk '{print "-I" $0}' /tmp/used_libraries.txt | tr '\n' ' ')"#
                .to_string(),
            r"avr-g++ -w -DARDUINO_ARCH_AVR -Os -ffunction-sections -fdata-sections -fno-exceptions \"
                .to_string(),
            format!(r"    -I{} \", self.layout.system_include),
            format!(r"    -I{core}/cores/arduino \"),
            format!(r"    -I{core}/variants/standard \"),
            r"    $INCLUDE_PATHS \".to_string(),
            format!(
                r"    -mmcu={} -DARDUINO=184 -DF_CPU={} -DUSB_VID=null -DUSB_PID=null -MMD \",
                target.device, target.clock_rate
            ),
            last_line.clone(),
        ]
        .join("\n")
            + "\n";

        CommandSpec::new(
            command,
            ExpectedOutput::lines([format!("> {last_line}"), self.work_prompt.to_string()]),
        )
    }

    fn link_executable(&self, target: &Target) -> CommandSpec {
        let last_line = "    -lm -lc";

        let command = [
            format!(
                r"avr-gcc -w -Os -Wl,--gc-sections -mmcu={} -DARDUINO=184 -DF_CPU={} -DUSB_VID=null -DUSB_PID=null \",
                target.device, target.clock_rate
            ),
            format!(r"    {} \", self.path("main.o")),
            format!(
                r"    -L{}/{}/lib -l:core.a \",
                self.layout.toolchain_root, target.device
            ),
            format!(r"    -o {} \", self.path("main.elf")),
            last_line.to_string(),
        ]
        .join("\n")
            + "\n";

        CommandSpec::new(
            command,
            ExpectedOutput::lines([format!("> {last_line}"), self.work_prompt.to_string()]),
        )
    }

    fn convert_artifact(&self) -> CommandSpec {
        let command = format!(
            "avr-objcopy -O ihex -R .eeprom {} {}",
            self.path("main.elf"),
            self.path("main.hex")
        );
        CommandSpec::new(command.clone(), ExpectedOutput::lines([command]))
    }

    fn retrieve_artifact(&self) -> CommandSpec {
        CommandSpec::new(
            format!("cat {}", self.path("main.hex")),
            ExpectedOutput::lines([":"]),
        )
    }
}

/// Collect Intel HEX records from the retrieval output
///
/// Every line starting with `:` is a record; records are joined with CRLF
/// and terminated by a final CRLF.
pub fn collect_artifact(lines: &[String]) -> String {
    let mut artifact = lines
        .iter()
        .filter(|line| line.starts_with(':'))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\r\n");
    artifact.push_str("\r\n");
    artifact
}
