use crate::naming::logical_name;
use crate::NameArgs;

pub(crate) fn name_cmd(args: &NameArgs) {
    for file in &args.files {
        println!("{}", logical_name(file));
    }
}
